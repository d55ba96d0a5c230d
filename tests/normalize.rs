use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use mothur_batch::domain::{FileFormat, LocalFile};
use mothur_batch::error::BatchError;
use mothur_batch::normalize::normalize;
use mothur_batch::workspace::Workspace;

struct Fixture {
    _temp: tempfile::TempDir,
    inputs: Utf8PathBuf,
    workspace: Workspace,
}

fn fixture() -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let inputs = root.join("inputs");
    std::fs::create_dir(&inputs).unwrap();
    let workspace = Workspace::create(&root.join("scratch")).unwrap();
    Fixture {
        _temp: temp,
        inputs,
        workspace,
    }
}

fn fasta_files(workspace: &Workspace) -> Vec<String> {
    std::fs::read_dir(workspace.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".fasta"))
        .collect()
}

#[test]
fn fastq_records_become_fasta() {
    let fx = fixture();
    let path = fx.inputs.join("reads.fastq");
    std::fs::write(&path, "@r1 desc\nACGT\n+\nIIII\n@r2\nGGCC\n+r2\nJJJJ\n@r3\nTT\n+\nII\n").unwrap();

    let out = normalize(LocalFile::new(path), &fx.workspace).unwrap();

    assert_eq!(out.path, fx.workspace.join("reads.fasta"));
    assert_eq!(out.format, FileFormat::Fasta);
    assert_eq!(
        std::fs::read_to_string(&out.path).unwrap(),
        ">r1 desc\nACGT\n>r2\nGGCC\n>r3\nTT\n"
    );
}

#[test]
fn gzipped_fastq_with_unsafe_name() {
    let fx = fixture();
    let path = fx.inputs.join("my reads-1.fq.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
    encoder.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
    encoder.finish().unwrap();

    let out = normalize(LocalFile::new(path.clone()), &fx.workspace).unwrap();

    assert_eq!(out.path, fx.workspace.join("my_reads_1.fasta"));
    assert_eq!(std::fs::read_to_string(&out.path).unwrap(), ">r1\nACGT\n");
    assert!(path.exists(), "the original input is left in place");
    assert!(!fx.workspace.join("my_reads_1.fq.gz").exists());
}

#[test]
fn alternate_fasta_suffix_is_renamed() {
    let fx = fixture();
    let path = fx.inputs.join("contigs.fa");
    std::fs::write(&path, ">c1\nACGT\n").unwrap();

    let out = normalize(LocalFile::new(path), &fx.workspace).unwrap();

    assert_eq!(out.path, fx.workspace.join("contigs.fasta"));
    assert_eq!(std::fs::read_to_string(&out.path).unwrap(), ">c1\nACGT\n");
}

#[test]
fn fasta_input_passes_through() {
    let fx = fixture();
    let path = fx.inputs.join("query.fasta");
    std::fs::write(&path, ">q\nACGT\n").unwrap();

    let out = normalize(LocalFile::new(path.clone()), &fx.workspace).unwrap();
    assert_eq!(out.path, path);
}

#[test]
fn malformed_spacer_leaves_no_output() {
    let fx = fixture();
    let path = fx.inputs.join("broken.fastq");
    std::fs::write(&path, "@r1\nACGT\n+\nIIII\n@r2\nGG\nII\nII\n").unwrap();

    let err = normalize(LocalFile::new(path), &fx.workspace).unwrap_err();

    assert_matches!(
        err,
        BatchError::MalformedRecord { line_number: 7, line, .. } if line == "II"
    );
    assert!(fasta_files(&fx.workspace).is_empty());
}

#[test]
fn unrecognized_content_is_rejected() {
    let fx = fixture();
    let path = fx.inputs.join("notes.txt");
    std::fs::write(&path, "plain text\n").unwrap();

    let err = normalize(LocalFile::new(path), &fx.workspace).unwrap_err();
    assert_matches!(err, BatchError::UnnormalizedInput(_));
}
