use std::io::{BufReader, BufWriter, Write};
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::info;

use crate::domain::{FileFormat, LocalFile};
use crate::error::BatchError;
use crate::fastq::FastqRecords;
use crate::fs_util;
use crate::workspace::Workspace;

/// Suffix the classifier requires for its reads.
pub const FASTA_SUFFIX: &str = "fasta";

static FORBIDDEN_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \-]").unwrap());

/// Brings a fetched file into the classifier's input contract: a FASTA file whose name
/// ends in `.fasta`. Each step runs only when its trigger holds.
pub fn normalize(file: LocalFile, workspace: &Workspace) -> Result<LocalFile, BatchError> {
    info!("Normalizing {} ({})", file.path, file.format);
    let mut file = sanitize_name(file, workspace)?;
    if file.format == FileFormat::Gzipped {
        file = decompress(file, workspace)?;
    }
    if file.format == FileFormat::Fastq {
        file = fastq_to_fasta(&file, workspace)?;
    }
    if file.format == FileFormat::Fasta && file.extension() != Some(FASTA_SUFFIX) {
        file = canonicalize_suffix(file, workspace)?;
    }
    if file.extension() != Some(FASTA_SUFFIX) {
        return Err(BatchError::UnnormalizedInput(file.path.into_std_path_buf()));
    }
    Ok(file)
}

pub fn sanitized_name(name: &str) -> String {
    FORBIDDEN_CHARS.replace_all(name, "_").into_owned()
}

/// Links the file under a name without spaces or hyphens. The original is untouched.
pub fn sanitize_name(file: LocalFile, workspace: &Workspace) -> Result<LocalFile, BatchError> {
    let name = file.file_name();
    if !FORBIDDEN_CHARS.is_match(name) {
        return Ok(file);
    }
    let target = workspace.join(&sanitized_name(name));
    info!("Linking {} as {target}", file.path);
    fs_util::link_file(&file.path, &target)?;
    Ok(LocalFile {
        path: target,
        format: file.format,
    })
}

/// Decompresses into the workspace and drops the `.gz` suffix. A compressed source that
/// lives in the workspace is removed afterwards.
pub fn decompress(file: LocalFile, workspace: &Workspace) -> Result<LocalFile, BatchError> {
    let name = match file.extension() {
        Some("gz" | "gzip") => file.path.file_stem().unwrap_or(file.file_name()).to_string(),
        _ => format!("{}.decompressed", file.file_name()),
    };
    let target = workspace.join(&name);
    info!("Decompressing {} to {target}", file.path);
    fs_util::gunzip_to(&file.path, &target)?;
    if workspace.contains(&file.path) {
        fs_util::remove_file(&file.path)?;
    }
    Ok(LocalFile::new(target))
}

/// Keeps header and sequence lines of every record, with the header sentinel switched
/// from `@` to `>`. Output only appears once the whole input has been validated.
pub fn fastq_to_fasta(file: &LocalFile, workspace: &Workspace) -> Result<LocalFile, BatchError> {
    let name = match file.extension() {
        Some("fastq" | "fq") => {
            format!("{}.{FASTA_SUFFIX}", file.path.file_stem().unwrap_or(file.file_name()))
        }
        _ => format!("{}.{FASTA_SUFFIX}", file.file_name()),
    };
    let target = workspace.join(&name);
    info!("Converting {} to FASTA", file.path);

    let reader = BufReader::new(fs_util::open(&file.path)?);
    let staged = NamedTempFile::new_in(workspace.path())
        .map_err(|err| BatchError::Filesystem(format!("create temp file: {err}")))?;
    let mut out = BufWriter::new(staged);

    // A header without its sequence line surfaces as a MalformedRecord from the reader.
    let mut n_records = 0usize;
    for record in FastqRecords::new(reader, file.path.as_std_path()) {
        let record = record?;
        writeln!(out, ">{}", record.header)
            .and_then(|_| writeln!(out, "{}", record.sequence))
            .map_err(|err| BatchError::Filesystem(format!("write {target}: {err}")))?;
        n_records += 1;
    }

    let staged = out
        .into_inner()
        .map_err(|err| BatchError::Filesystem(format!("write {target}: {}", err.error())))?;
    staged
        .persist(target.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("persist {target}: {}", err.error)))?;
    info!("Converted {n_records} records to FASTA");
    Ok(LocalFile {
        path: target,
        format: FileFormat::Fasta,
    })
}

/// Renames alternate FASTA suffixes (`.fa`, `.fna`, `.fas`, or none) to `.fasta`.
pub fn canonicalize_suffix(file: LocalFile, workspace: &Workspace) -> Result<LocalFile, BatchError> {
    let name = match file.extension().and_then(FileFormat::from_extension) {
        Some(FileFormat::Fasta) => {
            format!("{}.{FASTA_SUFFIX}", file.path.file_stem().unwrap_or(file.file_name()))
        }
        _ => format!("{}.{FASTA_SUFFIX}", file.file_name()),
    };
    let target: Utf8PathBuf = workspace.join(&name);
    info!("Renaming {} to {target}", file.path);
    if workspace.contains(&file.path) {
        fs_util::rename(&file.path, &target)?;
    } else {
        fs_util::link_file(&file.path, &target)?;
    }
    Ok(LocalFile {
        path: target,
        format: FileFormat::Fasta,
    })
}
