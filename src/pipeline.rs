use camino::Utf8PathBuf;
use chrono::Local;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::collect::{RunMetadata, collect};
use crate::config::{Config, ToolPaths};
use crate::domain::InputLocator;
use crate::error::BatchError;
use crate::exec::{CommandRunner, find_in_path};
use crate::fetch::{FetchTools, Fetcher, References, fetch_references};
use crate::http::HttpDownloader;
use crate::logging::RunLog;
use crate::normalize::normalize;
use crate::object_store::ObjectStore;
use crate::publish::{Destination, Publisher};
use crate::tool::{Classifier, ClassifierParams};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scratch_root: Utf8PathBuf,
    pub destination: Destination,
    pub processors: usize,
    pub keep_workspace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Published,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub input: String,
    pub status: ItemStatus,
    pub location: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn failed(&self) -> usize {
        self.count(ItemStatus::Failed)
    }
}

pub struct Pipeline<R: CommandRunner, S: ObjectStore, H: HttpDownloader> {
    runner: R,
    store: S,
    http: H,
    config: Config,
    fetch_tools: FetchTools,
    params: ClassifierParams,
    options: PipelineOptions,
    run_log: RunLog,
}

impl<R: CommandRunner, S: ObjectStore, H: HttpDownloader> Pipeline<R, S, H> {
    pub fn new(
        runner: R,
        store: S,
        http: H,
        config: Config,
        options: PipelineOptions,
        run_log: RunLog,
    ) -> Self {
        let fetch_tools = config.fetch_tools();
        let params = config.classifier_params(options.processors);
        Self {
            runner,
            store,
            http,
            config,
            fetch_tools,
            params,
            options,
            run_log,
        }
    }

    /// Classifies every input in order. Stops at the first failure unless `keep_going`,
    /// in which case failures are recorded in the report.
    pub fn run_batch(
        &self,
        inputs: &[InputLocator],
        ref_fasta: &str,
        ref_taxonomy: &str,
        keep_going: bool,
    ) -> Result<BatchReport, BatchError> {
        let reference_workspace = Workspace::create(&self.options.scratch_root)?;
        let references =
            match fetch_references(ref_fasta, ref_taxonomy, &self.store, &reference_workspace) {
                Ok(references) => references,
                Err(err) => {
                    self.finish(reference_workspace);
                    return Err(err);
                }
            };

        let mut report = BatchReport::default();
        for input in inputs {
            info!("Processing input argument: {input}");
            match self.classify(input, &references) {
                Ok(item) => report.items.push(item),
                Err(err) if keep_going => {
                    error!("Failed to process {input}: {err}");
                    report.items.push(ItemReport {
                        input: input.to_string(),
                        status: ItemStatus::Failed,
                        location: None,
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => {
                    self.finish(reference_workspace);
                    return Err(err);
                }
            }
        }

        self.finish(reference_workspace);
        info!("Done");
        Ok(report)
    }

    /// Runs one input end to end. Already-published inputs are skipped before any
    /// workspace is allocated.
    pub fn classify(
        &self,
        input: &InputLocator,
        references: &References,
    ) -> Result<ItemReport, BatchError> {
        let publisher = Publisher::new(&self.store, &self.options.destination);
        let name = input.name();
        if publisher.exists(name)? {
            let location = self.options.destination.artifact_location(name);
            info!("Output already exists, skipping ({location})");
            return Ok(ItemReport {
                input: input.to_string(),
                status: ItemStatus::Skipped,
                location: Some(location),
                error: None,
            });
        }

        let workspace = Workspace::create(&self.options.scratch_root)?;
        let result = self.process(input, references, &publisher, &workspace);
        let cleanup = self.close(workspace);
        match (result, cleanup) {
            (Ok(location), Ok(())) => Ok(ItemReport {
                input: input.to_string(),
                status: ItemStatus::Published,
                location: Some(location),
                error: None,
            }),
            (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
            (Err(err), Err(cleanup_err)) => {
                warn!("Failed to remove temporary folder: {cleanup_err}");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    fn process(
        &self,
        input: &InputLocator,
        references: &References,
        publisher: &Publisher<'_, S>,
        workspace: &Workspace,
    ) -> Result<String, BatchError> {
        let fetcher = Fetcher::new(&self.runner, &self.store, &self.http, &self.fetch_tools);
        let raw = fetcher.fetch(input, workspace)?;
        let reads = normalize(raw, workspace)?;

        let classifier = Classifier::new(
            &self.runner,
            &self.config.tools.mothur,
            self.config.retry.tool_policy(),
            &self.params,
        );
        let outputs = classifier.classify(&reads, references, workspace)?;
        let mut result = collect(&outputs.per_read, &outputs.summary)?;
        outputs.remove()?;
        info!(
            "Parsed {} read assignments and {} summary rows",
            result.read_level.len(),
            result.summary.len()
        );

        info!("Reading in the logs");
        result.metadata = Some(RunMetadata {
            input_path: input.to_string(),
            input_name: input.name().to_string(),
            output_folder: publisher.destination().as_str().to_string(),
            logs: self.run_log.lines(),
            ref_fasta_url: references.fasta.url.clone(),
            ref_tax_url: references.taxonomy.url.clone(),
            created_at: Local::now().to_rfc3339(),
        });

        publisher.publish(&result, input.name(), workspace)
    }

    fn close(&self, workspace: Workspace) -> Result<(), BatchError> {
        if self.options.keep_workspace {
            workspace.keep();
            Ok(())
        } else {
            workspace.close()
        }
    }

    /// Failing to remove the reference workspace only warns.
    fn finish(&self, workspace: Workspace) {
        if let Err(err) = self.close(workspace) {
            warn!("Failed to remove temporary folder: {err}");
        }
    }
}

/// Names of configured tools that cannot be found. Missing tools only matter for the
/// sources actually used, so they are reported rather than rejected.
pub fn preflight(tools: &ToolPaths) -> Vec<String> {
    let missing: Vec<String> = tools
        .all()
        .into_iter()
        .filter(|tool| find_in_path(tool).is_none())
        .map(str::to_string)
        .collect();
    for tool in &missing {
        warn!("{tool} was not found on PATH");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_by_status() {
        let report = BatchReport {
            items: vec![
                ItemReport {
                    input: "sra://SRR1".to_string(),
                    status: ItemStatus::Published,
                    location: Some("/out/SRR1.json.gz".to_string()),
                    error: None,
                },
                ItemReport {
                    input: "sra://SRR2".to_string(),
                    status: ItemStatus::Failed,
                    location: None,
                    error: Some("boom".to_string()),
                },
            ],
        };
        assert_eq!(report.count(ItemStatus::Published), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.count(ItemStatus::Skipped), 0);
    }

    #[test]
    fn missing_tools_are_listed() {
        let tools = ToolPaths {
            mothur: "/nonexistent/mothur".to_string(),
            ..ToolPaths::default()
        };
        assert!(preflight(&tools).contains(&"/nonexistent/mothur".to_string()));
    }
}
