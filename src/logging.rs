use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8Path;
use chrono::Local;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;

use crate::error::BatchError;

/// In-memory copy of everything logged during a run, read back into result metadata.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lines(&self) -> Vec<String> {
        self.guard().clone()
    }
}

/// Buffers one formatted event and appends its lines when dropped.
pub struct RunLogWriter {
    log: RunLog,
    buf: Vec<u8>,
}

impl Write for RunLogWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RunLogWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        let mut lines = self.log.guard();
        lines.extend(text.lines().map(str::to_string));
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            log: self.clone(),
            buf: Vec::new(),
        }
    }
}

/// Local wall-clock timestamps, e.g. `2024-03-01 12:00:00,123`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S,%3f"))
    }
}

/// Installs the process-wide subscriber: `RUST_LOG` filtering (default `info`) over a
/// log file, stdout, and `run_log`.
pub fn init(log_file: &Utf8Path, run_log: &RunLog) -> Result<(), BatchError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("open log file {log_file}: {err}")))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_timer(LocalTimer);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_timer(LocalTimer);

    let capture_layer = tracing_subscriber::fmt::layer()
        .with_writer(run_log.clone())
        .with_ansi(false)
        .with_target(false)
        .with_timer(LocalTimer);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(file_layer)
        .with(stdout_layer)
        .with(capture_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| BatchError::Logging(err.to_string()))?;
    tracing::info!("Writing logs to {log_file}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_formatted_events() {
        let run_log = RunLog::new();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(run_log.clone())
                .with_ansi(false)
                .with_target(false)
                .with_timer(LocalTimer),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Processing input argument: sra://SRR1");
            tracing::warn!("second");
        });

        let lines = run_log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].ends_with("Processing input argument: sra://SRR1"));
        assert!(lines[1].contains("WARN"));
    }
}
