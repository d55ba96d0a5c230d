use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{BatchError, describe_exit};

/// Delay between attempts of a failing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    #[default]
    None,
    Fixed(Duration),
    /// `base * attempt`, so the first retry waits `base`.
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear(base) => *base * attempt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub tolerate_failure: bool,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self::default()
    }

    pub fn retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A single attempt whose failure is logged and otherwise ignored.
    pub fn tolerant() -> Self {
        Self {
            tolerate_failure: true,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub attempts: u32,
    /// Exit code of the last attempt. `None` if the process was killed by a signal or
    /// could not be started.
    pub exit_code: Option<i32>,
    /// Output of the last attempt, stdout and stderr merged in the order written.
    pub output: Vec<String>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait CommandRunner: Send + Sync {
    /// Runs `command[0]` with the remaining arguments. Returns `Ok` on success or on a
    /// tolerated failure, `BatchError::Execution` once retries are exhausted otherwise.
    fn run(&self, command: &[String], policy: RetryPolicy) -> Result<CommandOutcome, BatchError>;

    /// Like `run`, with `dir` as the working directory of the child.
    fn run_in(
        &self,
        dir: &Path,
        command: &[String],
        policy: RetryPolicy,
    ) -> Result<CommandOutcome, BatchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn attempt(&self, dir: Option<&Path>, program: &str, args: &[String]) -> (Option<i32>, Vec<String>) {
        match spawn_merged(dir, program, args) {
            Ok((code, output)) => (code, split_lines(&output)),
            Err(err) => (None, vec![format!("failed to launch {program}: {err}")]),
        }
    }
}

/// Runs the child with stdout and stderr sharing one pipe, so the captured lines keep
/// the order the child wrote them in.
fn spawn_merged(dir: Option<&Path>, program: &str, args: &[String]) -> io::Result<(Option<i32>, Vec<u8>)> {
    let (mut reader, writer) = io::pipe()?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let spawned = cmd.spawn();
    // The command holds the parent's copies of the write end; EOF needs them closed.
    drop(cmd);
    let mut child = spawned?;
    let mut output = Vec::new();
    reader.read_to_end(&mut output)?;
    let status = child.wait()?;
    Ok((status.code(), output))
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &[String], policy: RetryPolicy) -> Result<CommandOutcome, BatchError> {
        self.execute(None, command, policy)
    }

    fn run_in(
        &self,
        dir: &Path,
        command: &[String],
        policy: RetryPolicy,
    ) -> Result<CommandOutcome, BatchError> {
        self.execute(Some(dir), command, policy)
    }
}

impl SystemCommandRunner {
    fn execute(
        &self,
        dir: Option<&Path>,
        command: &[String],
        policy: RetryPolicy,
    ) -> Result<CommandOutcome, BatchError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| BatchError::Spawn {
                program: String::new(),
                message: "empty command".to_string(),
            })?;
        let command_line = command.join(" ");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            info!("Commands:");
            info!("{command_line}");
            let (exit_code, output) = self.attempt(dir, program, args);
            if !output.is_empty() {
                info!("Output of subprocess:");
                for line in &output {
                    info!("{line}");
                }
            }

            let outcome = CommandOutcome {
                attempts: attempt,
                exit_code,
                output,
            };
            if outcome.succeeded() {
                return Ok(outcome);
            }

            let retries_left = policy.max_retries.saturating_sub(attempt - 1);
            if retries_left > 0 {
                info!(
                    "{}, retrying {retries_left} more times",
                    describe_exit(&exit_code)
                );
                let delay = policy.backoff.delay(attempt);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                continue;
            }

            if policy.tolerate_failure {
                warn!(
                    "{} from `{command_line}`, but we will continue anyway",
                    describe_exit(&exit_code)
                );
                return Ok(outcome);
            }

            return Err(BatchError::Execution {
                command: command_line,
                code: exit_code,
            });
        }
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.to_string())
        .collect()
}

/// Resolves a tool name the way the shell would: explicit paths are checked as-is,
/// bare names are searched on `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let plain = dir.join(name);
        if plain.is_file() {
            return Some(plain);
        }
        let exe = dir.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}

pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_with_attempts() {
        let backoff = Backoff::Linear(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(300));
        assert_eq!(Backoff::None.delay(5), Duration::ZERO);
    }

    #[test]
    fn empty_command_is_rejected() {
        let runner = SystemCommandRunner::new();
        assert!(runner.run(&[], RetryPolicy::once()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn output_is_captured() {
        let runner = SystemCommandRunner::new();
        let outcome = runner
            .run(&args(["sh", "-c", "echo out; echo err >&2"]), RetryPolicy::once())
            .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.output, vec!["out".to_string(), "err".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn streams_are_interleaved_in_write_order() {
        let runner = SystemCommandRunner::new();
        let outcome = runner
            .run(
                &args(["sh", "-c", "echo a; sleep 0.1; echo b >&2; sleep 0.1; echo c"]),
                RetryPolicy::once(),
            )
            .unwrap();
        assert_eq!(outcome.output, vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_program_is_an_execution_failure() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run(&args(["definitely-not-a-real-binary-4821"]), RetryPolicy::once())
            .unwrap_err();
        assert!(matches!(err, BatchError::Execution { code: None, .. }));
    }
}
