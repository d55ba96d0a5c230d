use std::time::Duration;

use assert_matches::assert_matches;

use mothur_batch::config::{BackoffKind, ConfigLoader};
use mothur_batch::error::BatchError;
use mothur_batch::exec::Backoff;
use mothur_batch::sra::DEFAULT_MIRROR_ROOT;

#[test]
fn partial_config_keeps_other_defaults() {
    let config = ConfigLoader::parse(
        r#"{
            "tools": { "mothur": "/opt/mothur/mothur" },
            "classifier": { "iters": 200 },
            "retry": { "transfer_retries": 3, "backoff": "linear", "delay_ms": 250 }
        }"#,
    )
    .unwrap();

    assert_eq!(config.tools.mothur, "/opt/mothur/mothur");
    assert_eq!(config.tools.aws, "aws");
    assert_eq!(config.classifier.iters, 200);
    assert_eq!(config.classifier.ksize, 8);
    assert_eq!(config.sra.mirror_root, DEFAULT_MIRROR_ROOT);
    assert_eq!(config.retry.backoff, BackoffKind::Linear);

    let transfer = config.retry.transfer_policy();
    assert_eq!(transfer.max_retries, 3);
    assert!(!transfer.tolerate_failure);
    assert_eq!(transfer.backoff, Backoff::Linear(Duration::from_millis(250)));
    assert_eq!(config.retry.tool_policy().max_retries, 0);

    let params = config.classifier_params(4);
    assert_eq!(params.processors, 4);
    assert_eq!(params.method, "wang");
}

#[test]
fn explicit_path_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("missing.json");
    let err = ConfigLoader::resolve(Some(missing.as_path())).unwrap_err();
    assert_matches!(err, BatchError::ConfigRead(path) if path == missing);
}

#[test]
fn invalid_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mothur-batch.json");
    std::fs::write(&path, "{ \"tools\": [] }").unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(path.as_path())),
        Err(BatchError::ConfigParse(_))
    );
}

#[test]
fn fetch_tools_follow_config() {
    let config = ConfigLoader::parse(
        r#"{ "tools": { "curl": "/usr/bin/curl" }, "sra": { "mirror_root": "ftp://mirror/fastq" } }"#,
    )
    .unwrap();
    let tools = config.fetch_tools();
    assert_eq!(tools.sra.curl, "/usr/bin/curl");
    assert_eq!(tools.sra.mirror_root, "ftp://mirror/fastq");
    assert_eq!(tools.wget, "wget");
}
