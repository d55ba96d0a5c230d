use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BatchError;
use crate::exec::{Backoff, RetryPolicy};
use crate::fetch::FetchTools;
use crate::sra::{DEFAULT_MIRROR_ROOT, SraTools};
use crate::tool::ClassifierParams;

pub const CONFIG_FILE_NAME: &str = "mothur-batch.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub sra: SraConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolPaths {
    pub mothur: String,
    pub aws: String,
    pub wget: String,
    pub curl: String,
    pub fastq_dump: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mothur: "mothur".to_string(),
            aws: "aws".to_string(),
            wget: "wget".to_string(),
            curl: "curl".to_string(),
            fastq_dump: "fastq-dump".to_string(),
        }
    }
}

impl ToolPaths {
    pub fn all(&self) -> [&str; 5] {
        [
            self.mothur.as_str(),
            self.aws.as_str(),
            self.wget.as_str(),
            self.curl.as_str(),
            self.fastq_dump.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub method: String,
    pub ksize: u32,
    pub iters: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let params = ClassifierParams::default();
        Self {
            method: params.method,
            ksize: params.ksize,
            iters: params.iters,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SraConfig {
    pub mirror_root: String,
}

impl Default for SraConfig {
    fn default() -> Self {
        Self {
            mirror_root: DEFAULT_MIRROR_ROOT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    None,
    Fixed,
    Linear,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts for the classifier run.
    pub tool_retries: u32,
    /// Extra attempts for downloads and uploads.
    pub transfer_retries: u32,
    pub backoff: BackoffKind,
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        let delay = Duration::from_millis(self.delay_ms);
        match self.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(delay),
            BackoffKind::Linear => Backoff::Linear(delay),
        }
    }

    pub fn tool_policy(&self) -> RetryPolicy {
        RetryPolicy::retries(self.tool_retries).with_backoff(self.backoff())
    }

    pub fn transfer_policy(&self) -> RetryPolicy {
        RetryPolicy::retries(self.transfer_retries).with_backoff(self.backoff())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Gzipped reference alignment copied into each workflow workspace.
    pub reference_fasta: String,
    pub reference_taxonomy: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            reference_fasta: "/usr/local/dbs/silva.bacteria.fasta.gz".to_string(),
            reference_taxonomy: "/usr/local/dbs/silva.bacteria.gg.tax".to_string(),
        }
    }
}

impl Config {
    pub fn classifier_params(&self, processors: usize) -> ClassifierParams {
        ClassifierParams {
            method: self.classifier.method.clone(),
            ksize: self.classifier.ksize,
            iters: self.classifier.iters,
            processors,
        }
    }

    pub fn fetch_tools(&self) -> FetchTools {
        FetchTools {
            wget: self.tools.wget.clone(),
            transfer_retry: self.retry.transfer_policy(),
            sra: SraTools {
                curl: self.tools.curl.clone(),
                fastq_dump: self.tools.fastq_dump.clone(),
                mirror_root: self.sra.mirror_root.clone(),
                fallback_retry: self.retry.transfer_policy(),
            },
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Otherwise the working directory and then the user
    /// config directory are searched, falling back to defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Config, BatchError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::load(&local);
        }
        if let Some(user) = Self::user_config_path().filter(|path| path.exists()) {
            return Self::load(&user);
        }
        Ok(Config::default())
    }

    pub fn load(path: &Path) -> Result<Config, BatchError> {
        let content =
            fs::read_to_string(path).map_err(|_| BatchError::ConfigRead(path.to_path_buf()))?;
        let config = Self::parse(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Config, BatchError> {
        serde_json::from_str(content).map_err(|err| BatchError::ConfigParse(err.to_string()))
    }

    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mothur-batch").map(|dirs| dirs.config_dir().join("config.json"))
    }
}
