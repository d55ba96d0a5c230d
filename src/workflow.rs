//! End-to-end mothur run over a folder of interleaved paired-end FASTQ files.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::BatchError;
use crate::exec::{CommandRunner, RetryPolicy, args};
use crate::fastq::FastqRecords;
use crate::fs_util;
use crate::object_store::{ObjectStore, S3Uri};
use crate::publish::Destination;
use crate::workspace::Workspace;

/// Every successful run leaves files with these endings in the workspace.
pub const REQUIRED_ENDINGS: [&str; 3] = [
    "precluster.count_table",
    "precluster.gg.wang.tx.list",
    "unique.precluster.dist",
];

const SAMPLE_SUFFIXES: [&str; 3] = [".fastq", ".fq", ".gz"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub sample: String,
    pub r1: Utf8PathBuf,
    pub r2: Utf8PathBuf,
}

fn open_maybe_gz(path: &Utf8Path) -> Result<Box<dyn BufRead>, BatchError> {
    let file = fs_util::open(path)?;
    if path.as_str().ends_with(".gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Splits interleaved records into `<path>.R1.fastq` and `<path>.R2.fastq`, alternating
/// from the first record. Returns `None` for files that do not start with `@`.
pub fn split_interleaved(path: &Utf8Path) -> Result<Option<(Utf8PathBuf, Utf8PathBuf)>, BatchError> {
    let mut first = [0u8; 1];
    let n = open_maybe_gz(path)?
        .read(&mut first)
        .map_err(|err| BatchError::Filesystem(format!("read {path}: {err}")))?;
    if n == 0 || first[0] != b'@' {
        info!("{path} was not in valid FASTQ format");
        return Ok(None);
    }

    let r1_path = Utf8PathBuf::from(format!("{path}.R1.fastq"));
    let r2_path = Utf8PathBuf::from(format!("{path}.R2.fastq"));
    let mut r1 = BufWriter::new(fs_util::create(&r1_path)?);
    let mut r2 = BufWriter::new(fs_util::create(&r2_path)?);

    let mut count = 0usize;
    for record in FastqRecords::new(open_maybe_gz(path)?, path.as_std_path()) {
        let record = record?;
        let (out, out_path) = if count % 2 == 0 {
            (&mut r1, &r1_path)
        } else {
            (&mut r2, &r2_path)
        };
        write!(
            out,
            "@{}\n{}\n+{}\n{}\n",
            record.header, record.sequence, record.header, record.quality
        )
        .map_err(|err| BatchError::Filesystem(format!("write {out_path}: {err}")))?;
        count += 1;
    }
    for (out, out_path) in [(&mut r1, &r1_path), (&mut r2, &r2_path)] {
        out.flush()
            .map_err(|err| BatchError::Filesystem(format!("write {out_path}: {err}")))?;
    }

    info!("Split {path} into {} pairs of reads", count / 2);
    Ok(Some((r1_path, r2_path)))
}

pub fn sample_name(file_name: &str) -> String {
    SAMPLE_SUFFIXES
        .iter()
        .fold(file_name.to_string(), |name, suffix| name.replace(suffix, ""))
}

/// Splits every FASTQ-looking file in `input_dir` and writes the `sample\tR1\tR2`
/// manifest mothur's `make.contigs` reads.
pub fn make_manifest(input_dir: &Utf8Path, manifest: &Utf8Path) -> Result<Vec<ManifestEntry>, BatchError> {
    let mut entries: BTreeMap<String, ManifestEntry> = BTreeMap::new();
    for path in fs_util::list_dir(input_dir)? {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if !path.is_file() || !(file_name.ends_with('q') || file_name.ends_with("q.gz")) {
            continue;
        }
        let Some((r1, r2)) = split_interleaved(&path)? else {
            continue;
        };
        let sample = sample_name(file_name);
        if entries.contains_key(&sample) {
            return Err(BatchError::DuplicateSample(sample));
        }
        entries.insert(sample.clone(), ManifestEntry { sample, r1, r2 });
    }

    let mut out = BufWriter::new(fs_util::create(manifest)?);
    for entry in entries.values() {
        writeln!(out, "{}\t{}\t{}", entry.sample, entry.r1, entry.r2)
            .map_err(|err| BatchError::Filesystem(format!("write {manifest}: {err}")))?;
    }
    out.flush()
        .map_err(|err| BatchError::Filesystem(format!("write {manifest}: {err}")))?;
    Ok(entries.into_values().collect())
}

pub fn workflow_script(manifest: &Utf8Path, threads: usize, db_fasta: &Utf8Path, db_tax: &Utf8Path) -> String {
    [
        "# mothur workflow".to_string(),
        format!("make.contigs(file={manifest}, processors={threads})"),
        "screen.seqs(fasta=current, group=current, maxambig=0, maxlength=275)".to_string(),
        "unique.seqs()".to_string(),
        "count.seqs(name=current, group=current)".to_string(),
        format!("align.seqs(fasta=current, reference={db_fasta})"),
        "unique.seqs(fasta=current, count=current)".to_string(),
        "pre.cluster(fasta=current, count=current, diffs=2)".to_string(),
        format!(
            "classify.seqs(fasta=current, count=current, reference={db_fasta}, taxonomy={db_tax}, cutoff=80)"
        ),
        "cluster.split(fasta=current, count=current, taxonomy=current, splitmethod=classify, taxlevel=4, cutoff=0.15)".to_string(),
        "classify.otu(list=current, count=current, taxonomy=current, label=0.03)".to_string(),
        "phylotype(taxonomy=current)".to_string(),
        "make.shared(list=current, count=current, label=1)".to_string(),
    ]
    .join("\n")
}

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub input_folder: String,
    pub destination: Destination,
    pub prefix: String,
    pub threads: usize,
    pub scratch_root: Utf8PathBuf,
}

pub struct Workflow<R: CommandRunner, S: ObjectStore> {
    runner: R,
    store: S,
    config: Config,
    options: WorkflowOptions,
}

impl<R: CommandRunner, S: ObjectStore> Workflow<R, S> {
    pub fn new(runner: R, store: S, config: Config, options: WorkflowOptions) -> Self {
        Self {
            runner,
            store,
            config,
            options,
        }
    }

    /// Runs the workflow in a fresh workspace and returns the published locations.
    pub fn run(&self) -> Result<Vec<String>, BatchError> {
        let workspace = Workspace::create(&self.options.scratch_root)?;
        let result = self.run_in(&workspace);
        match (result, workspace.close()) {
            (Ok(published), Ok(())) => {
                info!("Done");
                Ok(published)
            }
            (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
            (Err(err), Err(cleanup_err)) => {
                warn!("Failed to remove temporary folder: {cleanup_err}");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    fn run_in(&self, workspace: &Workspace) -> Result<Vec<String>, BatchError> {
        let (db_fasta, db_tax) = self.stage_references(workspace)?;
        let input_dir = self.stage_inputs(workspace)?;

        let manifest = workspace.join(&format!("{}.files", self.options.prefix));
        let entries = make_manifest(&input_dir, &manifest)?;
        info!("Wrote manifest with {} samples to {manifest}", entries.len());

        let script = workflow_script(&manifest, self.options.threads, &db_fasta, &db_tax);
        info!("Running mothur command:\n{script}");
        let batch_file = workspace.join("mothur.batch");
        fs::write(batch_file.as_std_path(), format!("{script}\n"))
            .map_err(|err| BatchError::Filesystem(format!("write {batch_file}: {err}")))?;
        // Failures show up as missing outputs below.
        self.runner.run_in(
            workspace.path().as_std_path(),
            &args([self.config.tools.mothur.as_str(), batch_file.as_str()]),
            RetryPolicy::tolerant(),
        )?;
        fs_util::remove_file(&batch_file)?;

        check_outputs(workspace.path())?;
        self.rename_logfiles(workspace)?;
        self.publish(workspace)
    }

    fn stage_references(&self, workspace: &Workspace) -> Result<(Utf8PathBuf, Utf8PathBuf), BatchError> {
        let fasta_source = Utf8Path::new(&self.config.workflow.reference_fasta);
        let tax_source = Utf8Path::new(&self.config.workflow.reference_taxonomy);
        for source in [fasta_source, tax_source] {
            if !source.exists() {
                return Err(BatchError::MissingInput(source.as_std_path().to_path_buf()));
            }
        }

        let fasta_name = fasta_source.file_name().unwrap_or(fasta_source.as_str());
        let db_fasta = match fasta_name.strip_suffix(".gz") {
            Some(plain) => {
                let target = workspace.join(plain);
                info!("Decompressing {fasta_source} to {target}");
                fs_util::gunzip_to(fasta_source, &target)?;
                target
            }
            None => {
                let target = workspace.join(fasta_name);
                fs_util::copy_file(fasta_source, &target)?;
                target
            }
        };
        let db_tax = workspace.join(tax_source.file_name().unwrap_or(tax_source.as_str()));
        fs_util::copy_file(tax_source, &db_tax)?;
        Ok((db_fasta, db_tax))
    }

    fn stage_inputs(&self, workspace: &Workspace) -> Result<Utf8PathBuf, BatchError> {
        let input_dir = workspace.join("input");
        info!("Using temp folder for all input data: {input_dir}");
        let folder = &self.options.input_folder;
        if folder.starts_with("s3://") {
            info!("Fetching data from S3");
            let uri: S3Uri = format!("{}/", folder.trim_end_matches('/')).parse()?;
            self.store.sync_to_dir(&uri, &input_dir)?;
        } else {
            info!("Copying data from local path");
            let source = Utf8Path::new(folder);
            if !source.is_dir() {
                return Err(BatchError::MissingInput(source.as_std_path().to_path_buf()));
            }
            fs::create_dir_all(input_dir.as_std_path())
                .map_err(|err| BatchError::Filesystem(format!("create {input_dir}: {err}")))?;
            for path in fs_util::list_dir(source)? {
                if let (true, Some(name)) = (path.is_file(), path.file_name()) {
                    fs_util::copy_file(&path, &input_dir.join(name))?;
                }
            }
        }
        if !input_dir.is_dir() {
            return Err(BatchError::MissingInput(input_dir.into_std_path_buf()));
        }
        let count = fs_util::list_dir(&input_dir)?.len();
        info!("Number of files found in {input_dir}: {count}");
        Ok(input_dir)
    }

    fn rename_logfiles(&self, workspace: &Workspace) -> Result<(), BatchError> {
        for path in fs_util::list_dir(workspace.path())? {
            let Some(name) = path.file_name() else {
                continue;
            };
            if name.starts_with("mothur") && name.ends_with("logfile") {
                let renamed = workspace.join(&format!("{}{name}", self.options.prefix));
                info!("Renaming {name} to {renamed}");
                fs_util::rename(&path, &renamed)?;
            }
        }
        Ok(())
    }

    fn publish(&self, workspace: &Workspace) -> Result<Vec<String>, BatchError> {
        let mut published = Vec::new();
        for path in fs_util::list_dir(workspace.path())? {
            let Some(name) = path.file_name() else {
                continue;
            };
            if !path.is_file() || !name.starts_with(&self.options.prefix) {
                info!("Skipping: {name}");
                continue;
            }
            let location = self.options.destination.join(name);
            info!("Uploading: {name}");
            match &self.options.destination {
                Destination::ObjectStore(_) => {
                    self.store.upload(&path, &location.parse::<S3Uri>()?)?;
                }
                Destination::Folder(folder) => {
                    fs::create_dir_all(folder.as_std_path()).map_err(|err| {
                        BatchError::Filesystem(format!("create output folder {folder}: {err}"))
                    })?;
                    fs_util::copy_file(&path, Utf8Path::new(&location))?;
                }
            }
            published.push(location);
        }
        Ok(published)
    }
}

pub fn check_outputs(dir: &Utf8Path) -> Result<(), BatchError> {
    let names: Vec<String> = fs_util::list_dir(dir)?
        .iter()
        .filter_map(|path| path.file_name().map(str::to_string))
        .collect();
    for ending in REQUIRED_ENDINGS {
        if !names.iter().any(|name| name.ends_with(ending)) {
            return Err(BatchError::MissingOutput(dir.join(format!("*{ending}")).into_std_path_buf()));
        }
    }
    Ok(())
}
