use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use mothur_batch::domain::InputLocator;
use mothur_batch::error::BatchError;
use mothur_batch::exec::{CommandOutcome, CommandRunner, RetryPolicy};
use mothur_batch::fetch::{FetchTools, Fetcher};
use mothur_batch::http::HttpDownloader;
use mothur_batch::object_store::{AwsCliStore, ObjectStore, S3Uri};
use mothur_batch::workspace::Workspace;

/// Records every command. Downloads (`aws s3 cp s3://...`, `wget -O`) create their
/// target; `list-objects-v2` prints `listing`.
#[derive(Clone, Default)]
struct RecordingRunner {
    listing: Vec<String>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingRunner {
    fn listing(lines: &[&str]) -> Self {
        Self {
            listing: lines.iter().map(|line| line.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &[String], _policy: RetryPolicy) -> Result<CommandOutcome, BatchError> {
        self.calls.lock().unwrap().push(command.to_vec());
        let mut output = Vec::new();
        if command.iter().any(|arg| arg == "list-objects-v2") {
            output = self.listing.clone();
        } else if command.iter().any(|arg| arg == "cp") {
            let source = &command[command.len() - 2];
            if source.starts_with("s3://") {
                std::fs::write(command.last().unwrap(), b"@r1\nACGT\n+\nIIII\n").unwrap();
            }
        } else if let Some(flag) = command.iter().position(|arg| arg == "-O") {
            std::fs::write(&command[flag + 1], b"@r1\nACGT\n+\nIIII\n").unwrap();
        }
        Ok(CommandOutcome {
            attempts: 1,
            exit_code: Some(0),
            output,
        })
    }

    fn run_in(
        &self,
        _dir: &std::path::Path,
        command: &[String],
        policy: RetryPolicy,
    ) -> Result<CommandOutcome, BatchError> {
        self.run(command, policy)
    }
}

struct NoHttp;

impl HttpDownloader for NoHttp {
    fn download(&self, url: &str, _destination: &Utf8Path) -> Result<(), BatchError> {
        Err(BatchError::Http(format!("unexpected download of {url}")))
    }
}

fn scratch() -> (tempfile::TempDir, Workspace) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let workspace = Workspace::create(&root.join("scratch")).unwrap();
    (temp, workspace)
}

fn store(runner: &RecordingRunner) -> AwsCliStore<RecordingRunner> {
    AwsCliStore::new(runner.clone(), "aws", RetryPolicy::once())
}

#[test]
fn transfers_use_server_side_encryption() {
    let (_temp, workspace) = scratch();
    let runner = RecordingRunner::default();
    let store = store(&runner);
    let uri: S3Uri = "s3://bucket/results/SRR1.json.gz".parse().unwrap();
    let local = workspace.join("SRR1.json.gz");

    store.download(&uri, &local).unwrap();
    store.upload(&local, &uri).unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!(&call[..3], ["aws", "s3", "cp"]);
        let sse = call.iter().position(|arg| arg == "--sse").unwrap();
        assert_eq!(call[sse + 1], "AES256");
    }
    assert_eq!(&calls[0][calls[0].len() - 2..], [uri.to_string(), local.to_string()]);
    assert_eq!(&calls[1][calls[1].len() - 2..], [local.to_string(), uri.to_string()]);
}

#[test]
fn listing_decides_existence() {
    let uri: S3Uri = "s3://bucket/out/SRR1.json.gz".parse().unwrap();

    let runner = RecordingRunner::listing(&["None"]);
    assert!(!store(&runner).exists(&uri).unwrap());
    let call = &runner.calls()[0];
    let prefix = call.iter().position(|arg| arg == "--prefix").unwrap();
    assert_eq!(call[prefix + 1], "out/SRR1.json.gz");

    let runner = RecordingRunner::listing(&["out/SRR1.json.gz"]);
    assert!(store(&runner).exists(&uri).unwrap());

    let runner = RecordingRunner::listing(&[]);
    assert!(!store(&runner).exists(&uri).unwrap());
}

#[test]
fn ftp_reads_are_fetched_with_wget() {
    let (_temp, workspace) = scratch();
    let runner = RecordingRunner::default();
    let store = store(&runner);
    let tools = FetchTools::default();
    let locator: InputLocator = "ftp://host/x/r.fq".parse().unwrap();

    let file = Fetcher::new(&runner, &store, &NoHttp, &tools)
        .fetch(&locator, &workspace)
        .unwrap();

    let target = workspace.join("r.fq");
    assert_eq!(file.path, target);
    assert!(target.exists());
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "wget");
    let flag = calls[0].iter().position(|arg| arg == "-O").unwrap();
    assert_eq!(calls[0][flag + 1], target.as_str());
    assert_eq!(calls[0].last().unwrap(), "ftp://host/x/r.fq");
}

#[test]
fn s3_reads_land_under_their_key_name() {
    let (_temp, workspace) = scratch();
    let runner = RecordingRunner::default();
    let store = store(&runner);
    let tools = FetchTools::default();
    let locator: InputLocator = "s3://b/k/r.fq".parse().unwrap();

    let file = Fetcher::new(&runner, &store, &NoHttp, &tools)
        .fetch(&locator, &workspace)
        .unwrap();

    let target = workspace.join("r.fq");
    assert_eq!(file.path, target);
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(&calls[0][calls[0].len() - 2..], ["s3://b/k/r.fq", target.as_str()]);
    assert!(calls[0].iter().any(|arg| arg == "AES256"));
}
