//! Command execution layer
//!
//! Every external tool d3guard touches (systemctl, dconf, udevadm, loginctl,
//! notify-send) goes through a `CommandRunner`. The runner:
//! - Resolves the program on PATH first, so a missing tool is reported as
//!   `CommandError::NotFound` instead of a generic spawn failure
//! - Captures exit code, stdout and stderr
//! - Bounds every call with a timeout; an expired call is killed and
//!   reported as `CommandError::Timeout`
//!
//! The runner does not interpret output. Callers decide what a non-zero
//! exit means for them.

use crate::error::CommandError;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default timeout for external commands
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal)
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external programs
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;

    /// Like `run`, but a non-zero exit becomes `CommandError::Failed`
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let output = self.run(program, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runner backed by real processes
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let resolved =
            which::which(program).map_err(|_| CommandError::NotFound(program.to_string()))?;

        debug!("exec: {} {}", program, args.join(" "));

        let mut child = Command::new(&resolved)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| io_error(program, e))?;

        // Pipes are drained on their own threads so a chatty child cannot
        // block on a full pipe while we poll for exit.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout_pipe));
        let stderr_reader = thread::spawn(move || read_pipe(stderr_pipe));

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CommandError::Timeout {
                            program: program.to_string(),
                            secs: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(io_error(program, e)),
            }
        };

        Ok(CommandOutput {
            code: status.code().unwrap_or(-1),
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr: stderr_reader.join().unwrap_or_default(),
        })
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn io_error(program: &str, e: std::io::Error) -> CommandError {
    CommandError::Io {
        program: program.to_string(),
        message: e.to_string(),
    }
}
