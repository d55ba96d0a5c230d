use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;

use camino::Utf8PathBuf;
use tracing::info;

use crate::domain::LocalFile;
use crate::error::BatchError;
use crate::exec::{CommandRunner, RetryPolicy, args};
use crate::fs_util;
use crate::workspace::Workspace;

pub const DEFAULT_MIRROR_ROOT: &str = "ftp://ftp.sra.ebi.ac.uk/vol1/fastq";

/// Paired-end mates first, then the single-end file. Concatenation follows this order.
pub const FILE_VARIANTS: [&str; 3] = ["_1.fastq.gz", "_2.fastq.gz", ".fastq.gz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubdirRule {
    Flat,
    /// Last `digits` characters of the accession, left-padded with zeros to three.
    ZeroPadded { digits: usize },
}

/// Mirror directory layout keyed by accession length, checked in order.
const LAYOUT: [(RangeInclusive<usize>, SubdirRule); 4] = [
    (0..=9, SubdirRule::Flat),
    (10..=10, SubdirRule::ZeroPadded { digits: 1 }),
    (11..=11, SubdirRule::ZeroPadded { digits: 2 }),
    (12..=12, SubdirRule::ZeroPadded { digits: 3 }),
];

/// Extra directory level for long accessions, `None` when the layout is flat.
pub fn accession_subdir(accession: &str) -> Result<Option<String>, BatchError> {
    let chars: Vec<char> = accession.chars().collect();
    let rule = LAYOUT
        .iter()
        .find(|(lengths, _)| lengths.contains(&chars.len()))
        .map(|(_, rule)| *rule)
        .ok_or_else(|| BatchError::AccessionTooLong(accession.to_string()))?;
    Ok(match rule {
        SubdirRule::Flat => None,
        SubdirRule::ZeroPadded { digits } => {
            let tail: String = chars[chars.len() - digits..].iter().collect();
            Some(format!("{tail:0>3}"))
        }
    })
}

/// `<root>/<first six>[/<subdir>]/<accession>/<accession>`, to which a file variant suffix
/// is appended.
pub fn mirror_base_url(root: &str, accession: &str) -> Result<String, BatchError> {
    let prefix: String = accession.chars().take(6).collect();
    let mut url = format!("{}/{prefix}", root.trim_end_matches('/'));
    if let Some(subdir) = accession_subdir(accession)? {
        url.push('/');
        url.push_str(&subdir);
    }
    url.push_str(&format!("/{accession}/{accession}"));
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct SraTools {
    pub curl: String,
    pub fastq_dump: String,
    pub mirror_root: String,
    /// Applied to the archive-tool fallback. Its failure is always tolerated so that a
    /// missing result surfaces as `SraFetch`.
    pub fallback_retry: RetryPolicy,
}

impl Default for SraTools {
    fn default() -> Self {
        Self {
            curl: "curl".to_string(),
            fastq_dump: "fastq-dump".to_string(),
            mirror_root: DEFAULT_MIRROR_ROOT.to_string(),
            fallback_retry: RetryPolicy::once(),
        }
    }
}

pub struct SraResolver<'a, R: CommandRunner> {
    runner: &'a R,
    tools: &'a SraTools,
}

impl<'a, R: CommandRunner> SraResolver<'a, R> {
    pub fn new(runner: &'a R, tools: &'a SraTools) -> Self {
        Self { runner, tools }
    }

    /// Fetches all reads for `accession` into `<workspace>/<accession>.fastq`.
    pub fn resolve(&self, accession: &str, workspace: &Workspace) -> Result<LocalFile, BatchError> {
        let base_url = mirror_base_url(&self.tools.mirror_root, accession)?;
        info!("Base info for downloading from ENA: {base_url}");
        let local_path = workspace.join(&format!("{accession}.fastq"));

        let downloaded = self.download_variants(&base_url, accession, workspace)?;
        if downloaded.is_empty() {
            info!("No files found on ENA, trying SRA");
            self.runner.run(
                &args([
                    self.tools.fastq_dump.as_str(),
                    "--outdir",
                    workspace.path().as_str(),
                    accession,
                ]),
                RetryPolicy {
                    tolerate_failure: true,
                    ..self.tools.fallback_retry
                },
            )?;
            if !local_path.exists() {
                return Err(BatchError::SraFetch(accession.to_string()));
            }
        } else {
            info!("Combining into a single FASTQ file");
            let mut out = BufWriter::new(fs_util::create(&local_path)?);
            for part in &downloaded {
                fs_util::gunzip_into(part, &mut out)?;
            }
            out.flush()
                .map_err(|err| BatchError::Filesystem(format!("write {local_path}: {err}")))?;
            info!("Cleaning up temporary files");
            for part in &downloaded {
                fs_util::remove_file(part)?;
            }
        }

        info!("Done fetching {accession}");
        Ok(LocalFile::new(local_path))
    }

    /// Each variant is tried once; failures are expected for whichever layout does not
    /// apply. Partial files from failed transfers are removed.
    fn download_variants(
        &self,
        base_url: &str,
        accession: &str,
        workspace: &Workspace,
    ) -> Result<Vec<Utf8PathBuf>, BatchError> {
        let mut downloaded = Vec::new();
        for variant in FILE_VARIANTS {
            let target = workspace.join(&format!("{accession}{variant}"));
            let url = format!("{base_url}{variant}");
            let outcome = self.runner.run(
                &args([
                    self.tools.curl.as_str(),
                    "--fail",
                    "--silent",
                    "--show-error",
                    "-o",
                    target.as_str(),
                    url.as_str(),
                ]),
                RetryPolicy::tolerant(),
            )?;
            if outcome.succeeded() && target.exists() {
                downloaded.push(target);
            } else if target.exists() {
                fs_util::remove_file(&target)?;
            }
        }
        Ok(downloaded)
    }
}
