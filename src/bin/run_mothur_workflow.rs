use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::Local;
use clap::Parser;

use mothur_batch::config::ConfigLoader;
use mothur_batch::error::BatchError;
use mothur_batch::exec::SystemCommandRunner;
use mothur_batch::logging::{self, RunLog};
use mothur_batch::object_store::AwsCliStore;
use mothur_batch::pipeline::preflight;
use mothur_batch::publish::Destination;
use mothur_batch::workflow::{Workflow, WorkflowOptions};

#[derive(Parser)]
#[command(name = "run-mothur-workflow")]
#[command(about = "Run mothur on a set of FASTQ files")]
#[command(version, author)]
struct Cli {
    /// Folder containing input files (s3:// or a local path).
    #[arg(long)]
    input_folder: String,

    /// Folder to place results (s3:// or a local path).
    #[arg(long)]
    output_folder: String,

    /// Prefix for every published file. Defaults to the current local time.
    #[arg(long)]
    output_prefix: Option<String>,

    #[arg(long, default_value_t = 16)]
    threads: usize,

    #[arg(long, default_value = "/scratch")]
    temp_folder: Utf8PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<BatchError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let prefix = cli
        .output_prefix
        .unwrap_or_else(|| Local::now().format("%Y_%m_%d_%H_%M").to_string());

    let run_log = RunLog::new();
    logging::init(&Utf8PathBuf::from(format!("{prefix}.log.txt")), &run_log)?;

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    preflight(&config.tools);

    let runner = SystemCommandRunner::new();
    let store = AwsCliStore::new(runner, config.tools.aws.clone(), config.retry.transfer_policy());
    let workflow = Workflow::new(
        runner,
        store,
        config,
        WorkflowOptions {
            input_folder: cli.input_folder,
            destination: Destination::parse(&cli.output_folder),
            prefix,
            threads: cli.threads,
            scratch_root: cli.temp_folder,
        },
    );
    workflow.run()?;
    Ok(())
}
