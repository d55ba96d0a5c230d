use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::{InputLocator, LocalFile, LocatorScheme};
use crate::error::BatchError;
use crate::exec::{CommandRunner, RetryPolicy, args};
use crate::http::HttpDownloader;
use crate::object_store::{ObjectStore, S3Uri};
use crate::sra::{SraResolver, SraTools};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct FetchTools {
    pub wget: String,
    pub transfer_retry: RetryPolicy,
    pub sra: SraTools,
}

impl Default for FetchTools {
    fn default() -> Self {
        Self {
            wget: "wget".to_string(),
            transfer_retry: RetryPolicy::once(),
            sra: SraTools::default(),
        }
    }
}

pub struct Fetcher<'a, R: CommandRunner, S: ObjectStore, H: HttpDownloader> {
    runner: &'a R,
    store: &'a S,
    http: &'a H,
    tools: &'a FetchTools,
}

impl<'a, R: CommandRunner, S: ObjectStore, H: HttpDownloader> Fetcher<'a, R, S, H> {
    pub fn new(runner: &'a R, store: &'a S, http: &'a H, tools: &'a FetchTools) -> Self {
        Self {
            runner,
            store,
            http,
            tools,
        }
    }

    /// Makes the reads named by `locator` available inside `workspace`.
    pub fn fetch(&self, locator: &InputLocator, workspace: &Workspace) -> Result<LocalFile, BatchError> {
        info!("Fetching {locator} ({})", locator.scheme());
        match locator.scheme() {
            LocatorScheme::Local => self.fetch_local(locator, workspace),
            LocatorScheme::S3 => {
                let uri: S3Uri = locator.as_str().parse()?;
                let target = workspace.join(locator.file_name());
                self.store.download(&uri, &target)?;
                downloaded(target)
            }
            LocatorScheme::Ftp => {
                let target = workspace.join(locator.file_name());
                self.runner.run(
                    &args([
                        self.tools.wget.as_str(),
                        "--quiet",
                        "-O",
                        target.as_str(),
                        locator.as_str(),
                    ]),
                    self.tools.transfer_retry,
                )?;
                downloaded(target)
            }
            LocatorScheme::Http | LocatorScheme::Https => {
                let target = workspace.join(locator.file_name());
                self.http.download(locator.as_str(), &target)?;
                downloaded(target)
            }
            LocatorScheme::Sra => {
                SraResolver::new(self.runner, &self.tools.sra).resolve(locator.name(), workspace)
            }
        }
    }

    /// Local reads are linked, never copied.
    fn fetch_local(&self, locator: &InputLocator, workspace: &Workspace) -> Result<LocalFile, BatchError> {
        let path = Utf8Path::new(locator.as_str());
        if !path.exists() {
            return Err(BatchError::MissingInput(path.as_std_path().to_path_buf()));
        }
        let source = canonical(path)?;
        let target = workspace.join(locator.file_name());
        info!("Linking {source} into {}", workspace.path());
        crate::fs_util::link_file(&source, &target)?;
        Ok(LocalFile::new(target))
    }
}

fn downloaded(path: Utf8PathBuf) -> Result<LocalFile, BatchError> {
    if !path.exists() {
        return Err(BatchError::MissingInput(path.into_std_path_buf()));
    }
    Ok(LocalFile::new(path))
}

fn canonical(path: &Utf8Path) -> Result<Utf8PathBuf, BatchError> {
    let resolved = fs::canonicalize(path.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("resolve {path}: {err}")))?;
    Utf8PathBuf::from_path_buf(resolved)
        .map_err(|path| BatchError::Filesystem(format!("non-utf8 path {}", path.display())))
}

/// A reference database file: where it was requested from and where it lives locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub url: String,
    pub path: Utf8PathBuf,
}

impl Reference {
    /// File name without its final suffix, as the classifier uses it in output names.
    pub fn stem(&self) -> &str {
        self.path.file_stem().unwrap_or(self.path.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct References {
    pub fasta: Reference,
    pub taxonomy: Reference,
}

pub const REFERENCE_FASTA_SUFFIX: &str = ".fasta";
pub const REFERENCE_TAXONOMY_SUFFIX: &str = ".tax";

/// Resolves both reference files. Object-store references are downloaded into
/// `workspace`, local ones are used in place.
pub fn fetch_references<S: ObjectStore>(
    fasta_url: &str,
    taxonomy_url: &str,
    store: &S,
    workspace: &Workspace,
) -> Result<References, BatchError> {
    check_suffix(fasta_url, REFERENCE_FASTA_SUFFIX)?;
    check_suffix(taxonomy_url, REFERENCE_TAXONOMY_SUFFIX)?;
    Ok(References {
        fasta: fetch_reference(fasta_url, store, workspace)?,
        taxonomy: fetch_reference(taxonomy_url, store, workspace)?,
    })
}

fn check_suffix(url: &str, expected: &str) -> Result<(), BatchError> {
    if url.ends_with(expected) {
        Ok(())
    } else {
        Err(BatchError::InvalidReference {
            path: url.to_string(),
            expected: expected.to_string(),
        })
    }
}

fn fetch_reference<S: ObjectStore>(
    url: &str,
    store: &S,
    workspace: &Workspace,
) -> Result<Reference, BatchError> {
    match LocatorScheme::detect(url)? {
        LocatorScheme::S3 => {
            let uri: S3Uri = url.parse()?;
            let name = url.rsplit('/').next().unwrap_or(url);
            let target = workspace.join(name);
            if target.exists() {
                return Err(BatchError::Filesystem(format!(
                    "reference {target} is already present in the workspace"
                )));
            }
            info!("Downloading reference {url}");
            store.download(&uri, &target)?;
            if !target.exists() {
                return Err(BatchError::MissingInput(target.into_std_path_buf()));
            }
            Ok(Reference {
                url: url.to_string(),
                path: target,
            })
        }
        LocatorScheme::Local => {
            let path = Utf8Path::new(url);
            if !path.exists() {
                return Err(BatchError::MissingInput(path.as_std_path().to_path_buf()));
            }
            Ok(Reference {
                url: url.to_string(),
                path: canonical(path)?,
            })
        }
        _ => Err(BatchError::UnsupportedSource(url.to_string())),
    }
}
