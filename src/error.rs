use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BatchError {
    #[error("invalid input locator: {0}")]
    InvalidLocator(String),

    #[error("did not recognize prefix to fetch reads: {0}")]
    UnsupportedSource(String),

    #[error("input file does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("invalid reference file {path}: expected a name ending in {expected}")]
    InvalidReference { path: String, expected: String },

    #[error("command `{command}` failed with {}", describe_exit(.code))]
    #[diagnostic(help("the full output of the command is in the run log"))]
    Execution { command: String, code: Option<i32> },

    #[error("failed to launch `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("accession is too long to map onto the archive layout: {0}")]
    AccessionTooLong(String),

    #[error("file could not be downloaded from SRA: {0}")]
    SraFetch(String),

    #[error("malformed FASTQ record in {path} at line {line_number}: {reason} ({line:?})")]
    MalformedRecord {
        path: PathBuf,
        line_number: usize,
        line: String,
        reason: String,
    },

    #[error("expected tool output is missing: {0}")]
    MissingOutput(PathBuf),

    #[error("malformed tool output in {path} at line {line_number}: {line:?}")]
    MalformedOutput {
        path: PathBuf,
        line_number: usize,
        line: String,
    },

    #[error("input could not be normalized to FASTA: {0}")]
    UnnormalizedInput(PathBuf),

    #[error("duplicate sample name in input folder: {0}")]
    DuplicateSample(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to set up logging: {0}")]
    Logging(String),

    #[error("failed to serialize results: {0}")]
    Serialization(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{failed} of {total} inputs failed")]
    BatchFailed { failed: usize, total: usize },
}

pub fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal or never started)".to_string(),
    }
}

impl BatchError {
    /// Process exit status: 2 for bad input, 3 for external tool or transfer failures,
    /// 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            BatchError::InvalidLocator(_)
            | BatchError::UnsupportedSource(_)
            | BatchError::MissingInput(_)
            | BatchError::InvalidReference { .. }
            | BatchError::AccessionTooLong(_)
            | BatchError::MalformedRecord { .. }
            | BatchError::UnnormalizedInput(_)
            | BatchError::DuplicateSample(_)
            | BatchError::ConfigRead(_)
            | BatchError::ConfigParse(_) => 2,
            BatchError::Execution { .. }
            | BatchError::Spawn { .. }
            | BatchError::SraFetch(_)
            | BatchError::MissingOutput(_)
            | BatchError::MalformedOutput { .. }
            | BatchError::Http(_)
            | BatchError::HttpStatus { .. }
            | BatchError::ObjectStore(_) => 3,
            _ => 1,
        }
    }
}
