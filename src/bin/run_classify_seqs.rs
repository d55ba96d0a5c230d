use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;

use mothur_batch::config::ConfigLoader;
use mothur_batch::domain::parse_locators;
use mothur_batch::error::BatchError;
use mothur_batch::exec::SystemCommandRunner;
use mothur_batch::http::HttpClient;
use mothur_batch::logging::{self, RunLog};
use mothur_batch::object_store::AwsCliStore;
use mothur_batch::output::JsonOutput;
use mothur_batch::pipeline::{Pipeline, PipelineOptions, preflight};
use mothur_batch::publish::Destination;

#[derive(Parser)]
#[command(name = "run-classify-seqs")]
#[command(about = "Classify a set of reads with mothur classify.seqs and publish the results")]
#[command(version, author)]
struct Cli {
    /// Comma-separated reads: local path, s3://, sra://, ftp://, http:// or https://.
    #[arg(long)]
    input: String,

    /// Reference alignment, local or s3://, ending in .fasta.
    #[arg(long)]
    ref_fasta: String,

    /// Reference taxonomy, local or s3://, ending in .tax.
    #[arg(long)]
    ref_taxonomy: String,

    /// Where results are placed (s3:// or a local folder).
    #[arg(long)]
    output_folder: String,

    #[arg(long, default_value_t = 16)]
    threads: usize,

    /// Folder used for temporary files.
    #[arg(long, default_value = "/scratch")]
    temp_folder: Utf8PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "log.txt")]
    log_file: Utf8PathBuf,

    /// Continue with the remaining inputs after a failure.
    #[arg(long)]
    keep_going: bool,

    /// Leave temporary folders on disk.
    #[arg(long)]
    keep_workspace: bool,

    /// Print a JSON batch report to stdout.
    #[arg(long)]
    json: bool,
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
    let run_log = RunLog::new();
    logging::init(&cli.log_file, &run_log)?;

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    preflight(&config.tools);
    let inputs = parse_locators(&cli.input)?;

    let runner = SystemCommandRunner::new();
    let store = AwsCliStore::new(runner, config.tools.aws.clone(), config.retry.transfer_policy());
    let http = HttpClient::new()?;
    let options = PipelineOptions {
        scratch_root: cli.temp_folder,
        destination: Destination::parse(&cli.output_folder),
        processors: cli.threads,
        keep_workspace: cli.keep_workspace,
    };
    let pipeline = Pipeline::new(runner, store, http, config, options, run_log);

    let report = pipeline.run_batch(&inputs, &cli.ref_fasta, &cli.ref_taxonomy, cli.keep_going)?;
    if cli.json {
        JsonOutput::print_report(&report).into_diagnostic()?;
    }
    if report.failed() > 0 {
        return Err(BatchError::BatchFailed {
            failed: report.failed(),
            total: report.items.len(),
        }
        .into());
    }
    Ok(())
}
