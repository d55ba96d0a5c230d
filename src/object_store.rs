use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use tracing::info;

use crate::error::BatchError;
use crate::exec::{CommandRunner, RetryPolicy, args};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix("s3://")
            .ok_or_else(|| BatchError::ObjectStore(format!("not an s3:// URI: {value}")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(BatchError::ObjectStore(format!("missing bucket in {value}")));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Object store operations the pipeline needs. Transfers use server-side encryption.
pub trait ObjectStore: Send + Sync {
    /// True when at least one object exists under `uri` taken as a key prefix.
    fn exists(&self, uri: &S3Uri) -> Result<bool, BatchError>;
    fn download(&self, uri: &S3Uri, destination: &Utf8Path) -> Result<(), BatchError>;
    fn upload(&self, source: &Utf8Path, uri: &S3Uri) -> Result<(), BatchError>;
    /// Copies every object under the `uri` prefix into `destination`.
    fn sync_to_dir(&self, uri: &S3Uri, destination: &Utf8Path) -> Result<(), BatchError>;
}

/// `ObjectStore` backed by the `aws` command line client.
pub struct AwsCliStore<R: CommandRunner> {
    runner: R,
    aws: String,
    retry: RetryPolicy,
}

impl<R: CommandRunner> AwsCliStore<R> {
    pub fn new(runner: R, aws: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            runner,
            aws: aws.into(),
            retry,
        }
    }
}

impl<R: CommandRunner> ObjectStore for AwsCliStore<R> {
    fn exists(&self, uri: &S3Uri) -> Result<bool, BatchError> {
        info!("Checking whether {uri} already exists on S3");
        let outcome = self.runner.run(
            &args([
                self.aws.as_str(),
                "s3api",
                "list-objects-v2",
                "--bucket",
                uri.bucket.as_str(),
                "--prefix",
                uri.key.as_str(),
                "--max-items",
                "1",
                "--query",
                "Contents[].Key",
                "--output",
                "text",
            ]),
            self.retry,
        )?;
        Ok(outcome
            .output
            .iter()
            .any(|line| !line.trim().is_empty() && line.trim() != "None"))
    }

    fn download(&self, uri: &S3Uri, destination: &Utf8Path) -> Result<(), BatchError> {
        let uri = uri.to_string();
        self.runner.run(
            &args([
                self.aws.as_str(),
                "s3",
                "cp",
                "--quiet",
                "--sse",
                "AES256",
                uri.as_str(),
                destination.as_str(),
            ]),
            self.retry,
        )?;
        Ok(())
    }

    fn upload(&self, source: &Utf8Path, uri: &S3Uri) -> Result<(), BatchError> {
        let uri = uri.to_string();
        self.runner.run(
            &args([
                self.aws.as_str(),
                "s3",
                "cp",
                "--quiet",
                "--sse",
                "AES256",
                source.as_str(),
                uri.as_str(),
            ]),
            self.retry,
        )?;
        Ok(())
    }

    fn sync_to_dir(&self, uri: &S3Uri, destination: &Utf8Path) -> Result<(), BatchError> {
        let uri = uri.to_string();
        self.runner.run(
            &args([
                self.aws.as_str(),
                "s3",
                "sync",
                uri.as_str(),
                destination.as_str(),
            ]),
            self.retry,
        )?;
        Ok(())
    }
}
