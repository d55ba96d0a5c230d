use std::fs;
use std::io::BufWriter;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::collect::ClassificationResult;
use crate::error::BatchError;
use crate::fs_util;
use crate::object_store::{ObjectStore, S3Uri};
use crate::workspace::Workspace;

pub const ARTIFACT_SUFFIX: &str = ".json.gz";

/// Where results go: a bucket prefix or a local folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    ObjectStore(String),
    Folder(Utf8PathBuf),
}

impl Destination {
    pub fn parse(value: &str) -> Self {
        if value.starts_with("s3://") {
            Destination::ObjectStore(value.to_string())
        } else {
            Destination::Folder(Utf8PathBuf::from(value))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Destination::ObjectStore(prefix) => prefix,
            Destination::Folder(path) => path.as_str(),
        }
    }

    /// `<destination>/<name>`, with trailing slashes on the destination collapsed.
    pub fn join(&self, name: &str) -> String {
        format!("{}/{name}", self.as_str().trim_end_matches('/'))
    }

    pub fn artifact_location(&self, name: &str) -> String {
        self.join(&format!("{name}{ARTIFACT_SUFFIX}"))
    }
}

pub struct Publisher<'a, S: ObjectStore> {
    store: &'a S,
    destination: &'a Destination,
}

impl<'a, S: ObjectStore> Publisher<'a, S> {
    pub fn new(store: &'a S, destination: &'a Destination) -> Self {
        Self { store, destination }
    }

    pub fn destination(&self) -> &Destination {
        self.destination
    }

    pub fn exists(&self, name: &str) -> Result<bool, BatchError> {
        let location = self.destination.artifact_location(name);
        match self.destination {
            Destination::ObjectStore(_) => self.store.exists(&location.parse::<S3Uri>()?),
            Destination::Folder(_) => Ok(Utf8Path::new(&location).exists()),
        }
    }

    /// Writes `<name>.json.gz` in the workspace, then hands it to the destination.
    pub fn publish(
        &self,
        result: &ClassificationResult,
        name: &str,
        workspace: &Workspace,
    ) -> Result<String, BatchError> {
        let json_path = workspace.join(&format!("{name}.json"));
        let writer = BufWriter::new(fs_util::create(&json_path)?);
        serde_json::to_writer(writer, result)
            .map_err(|err| BatchError::Serialization(err.to_string()))?;
        let gz_path = fs_util::gzip_in_place(&json_path)?;
        self.deliver(&gz_path)
    }

    /// Copies or moves a finished file into the destination under its own name.
    pub fn deliver(&self, path: &Utf8Path) -> Result<String, BatchError> {
        let name = path
            .file_name()
            .ok_or_else(|| BatchError::Filesystem(format!("no file name in {path}")))?;
        let location = self.destination.join(name);
        info!("Copying {path} to {location}");
        match self.destination {
            Destination::ObjectStore(_) => {
                self.store.upload(path, &location.parse::<S3Uri>()?)?;
            }
            Destination::Folder(folder) => {
                fs::create_dir_all(folder.as_std_path()).map_err(|err| {
                    BatchError::Filesystem(format!("create output folder {folder}: {err}"))
                })?;
                fs_util::move_file(path, Utf8Path::new(&location))?;
            }
        }
        Ok(location)
    }
}
