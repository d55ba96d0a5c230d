#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use mothur_batch::config::Config;
use mothur_batch::error::BatchError;
use mothur_batch::exec::SystemCommandRunner;
use mothur_batch::object_store::{ObjectStore, S3Uri};
use mothur_batch::publish::Destination;
use mothur_batch::workflow::{Workflow, WorkflowOptions};

/// Writes the files a finished run leaves behind, named after the manifest.
const FAKE_MOTHUR: &str = r#"#!/bin/sh
manifest=$(sed -n 's/^make.contigs(file=\([^,]*\),.*/\1/p' "$1")
base=${manifest%.files}
touch "$base.trim.contigs.good.unique.precluster.count_table"
touch "$base.trim.contigs.good.unique.precluster.gg.wang.tx.list"
touch "$base.trim.contigs.good.unique.precluster.dist"
echo "mothur log" > mothur.1700000000.logfile
"#;

struct LocalOnly;

impl ObjectStore for LocalOnly {
    fn exists(&self, _uri: &S3Uri) -> Result<bool, BatchError> {
        Ok(false)
    }
    fn download(&self, uri: &S3Uri, _destination: &Utf8Path) -> Result<(), BatchError> {
        Err(BatchError::ObjectStore(format!("unexpected download of {uri}")))
    }
    fn upload(&self, _source: &Utf8Path, uri: &S3Uri) -> Result<(), BatchError> {
        Err(BatchError::ObjectStore(format!("unexpected upload to {uri}")))
    }
    fn sync_to_dir(&self, uri: &S3Uri, _destination: &Utf8Path) -> Result<(), BatchError> {
        Err(BatchError::ObjectStore(format!("unexpected sync of {uri}")))
    }
}

fn executable(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn setup(root: &Utf8Path, mothur_script: &str) -> (Config, WorkflowOptions) {
    let mut encoder = GzEncoder::new(
        std::fs::File::create(root.join("silva.bacteria.fasta.gz")).unwrap(),
        Compression::default(),
    );
    encoder.write_all(b">ref1\nACGT\n").unwrap();
    encoder.finish().unwrap();
    std::fs::write(root.join("silva.bacteria.gg.tax"), "ref1\tBacteria;\n").unwrap();

    let input = root.join("reads");
    std::fs::create_dir(&input).unwrap();
    std::fs::write(
        input.join("gut.fastq"),
        "@p1/1\nAC\n+\nII\n@p1/2\nGT\n+\nII\n",
    )
    .unwrap();

    executable(root.join("fake-mothur").as_std_path(), mothur_script);

    let mut config = Config::default();
    config.tools.mothur = root.join("fake-mothur").to_string();
    config.workflow.reference_fasta = root.join("silva.bacteria.fasta.gz").to_string();
    config.workflow.reference_taxonomy = root.join("silva.bacteria.gg.tax").to_string();

    let options = WorkflowOptions {
        input_folder: input.to_string(),
        destination: Destination::Folder(root.join("results")),
        prefix: "run1".to_string(),
        threads: 2,
        scratch_root: root.join("scratch"),
    };
    (config, options)
}

fn names(dir: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn prefixed_outputs_are_published() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let (config, options) = setup(&root, FAKE_MOTHUR);

    let published = Workflow::new(SystemCommandRunner::new(), LocalOnly, config, options)
        .run()
        .unwrap();

    assert_eq!(
        names(&root.join("results")),
        vec![
            "run1.files",
            "run1.trim.contigs.good.unique.precluster.count_table",
            "run1.trim.contigs.good.unique.precluster.dist",
            "run1.trim.contigs.good.unique.precluster.gg.wang.tx.list",
            "run1mothur.1700000000.logfile",
        ]
    );
    assert_eq!(published.len(), 5);

    let manifest = std::fs::read_to_string(root.join("results/run1.files")).unwrap();
    assert!(manifest.starts_with("gut\t"));
    assert_eq!(names(&root.join("reads")), vec!["gut.fastq"]);
    assert!(names(&root.join("scratch")).is_empty());
}

#[test]
fn missing_outputs_fail_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let (config, options) = setup(&root, "#!/bin/sh\nexit 1\n");

    let err = Workflow::new(SystemCommandRunner::new(), LocalOnly, config, options)
        .run()
        .unwrap_err();

    assert_matches!(err, BatchError::MissingOutput(_));
    assert!(!root.join("results").exists());
    assert!(names(&root.join("scratch")).is_empty());
}
