use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::LocalFile;
use crate::error::BatchError;
use crate::exec::{CommandRunner, RetryPolicy, args};
use crate::fetch::References;
use crate::normalize::FASTA_SUFFIX;
use crate::workspace::Workspace;

pub const BATCH_FILE_NAME: &str = "batchfile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierParams {
    pub method: String,
    pub ksize: u32,
    pub iters: u32,
    pub processors: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            method: "wang".to_string(),
            ksize: 8,
            iters: 100,
            processors: 16,
        }
    }
}

/// The two files `classify.seqs` writes next to its reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOutputs {
    pub per_read: Utf8PathBuf,
    pub summary: Utf8PathBuf,
}

impl ClassifierOutputs {
    /// `<reads stem>.<reference stem>.<method>.taxonomy` and `....<method>.tax.summary`,
    /// in the directory holding the reads.
    pub fn expected(reads: &Utf8Path, reference_fasta: &Utf8Path, method: &str) -> Self {
        let reads_stem = strip_fasta(reads.as_str());
        let ref_name = reference_fasta.file_name().unwrap_or(reference_fasta.as_str());
        let ref_stem = strip_fasta(ref_name);
        Self {
            per_read: Utf8PathBuf::from(format!("{reads_stem}.{ref_stem}.{method}.taxonomy")),
            summary: Utf8PathBuf::from(format!("{reads_stem}.{ref_stem}.{method}.tax.summary")),
        }
    }

    pub fn remove(&self) -> Result<(), BatchError> {
        for path in [&self.per_read, &self.summary] {
            if path.exists() {
                crate::fs_util::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn strip_fasta(name: &str) -> &str {
    name.strip_suffix(&format!(".{FASTA_SUFFIX}")).unwrap_or(name)
}

pub fn batch_script(reads: &Utf8Path, references: &References, params: &ClassifierParams) -> String {
    format!(
        "classify.seqs(fasta={}, template={}, taxonomy={}, method={}, ksize={}, iters={}, processors={})",
        reads,
        references.fasta.path,
        references.taxonomy.path,
        params.method,
        params.ksize,
        params.iters,
        params.processors,
    )
}

/// Runs mothur `classify.seqs` on normalized reads.
pub struct Classifier<'a, R: CommandRunner> {
    runner: &'a R,
    mothur: &'a str,
    retry: RetryPolicy,
    params: &'a ClassifierParams,
}

impl<'a, R: CommandRunner> Classifier<'a, R> {
    pub fn new(runner: &'a R, mothur: &'a str, retry: RetryPolicy, params: &'a ClassifierParams) -> Self {
        Self {
            runner,
            mothur,
            retry,
            params,
        }
    }

    pub fn classify(
        &self,
        reads: &LocalFile,
        references: &References,
        workspace: &Workspace,
    ) -> Result<ClassifierOutputs, BatchError> {
        let script = batch_script(&reads.path, references, self.params);
        let batch_file = workspace.join(BATCH_FILE_NAME);
        fs::write(batch_file.as_std_path(), format!("{script}\n"))
            .map_err(|err| BatchError::Filesystem(format!("write {batch_file}: {err}")))?;

        info!("Running mothur.classify.seqs");
        self.runner
            .run(&args([self.mothur, batch_file.as_str()]), self.retry)?;

        Ok(ClassifierOutputs::expected(
            &reads.path,
            &references.fasta.path,
            &self.params.method,
        ))
    }
}
