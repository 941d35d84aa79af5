// Runs external probe commands with a hard wall-clock ceiling

use crate::clock::{Clock, SystemClock};
use crate::errors::{Result, TbError};
use std::fs::File;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ceiling for a single probe command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawns a command and returns the first whitespace-delimited token of its stdout
#[derive(Clone)]
pub struct CommandRunner {
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self::new_with_clock(timeout, Arc::new(SystemClock))
    }

    pub fn new_with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { timeout, clock }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a whitespace-separated command line (no shell is involved)
    pub fn execute_line(&self, command: &str) -> Result<String> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| TbError::CommandFailed("Empty command".to_string()))?;
        let args: Vec<String> = parts.collect();
        self.execute(&program, &args)
    }

    /// Execute `program args...` and return the first stdout token, or an empty
    /// string if nothing was printed before the process exited or timed out.
    pub fn execute(&self, program: &str, args: &[String]) -> Result<String> {
        // Output goes to a temp file so a chatty command can't fill the pipe and stall
        let stdout_file = tempfile::NamedTempFile::new().map_err(|e| {
            TbError::CommandFailed(format!("Failed to create temp file for stdout: {}", e))
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout_file.reopen()?)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TbError::CommandFailed(format!("Failed to spawn '{}': {}", program, e)))?;

        match wait_with_timeout(&mut child, self.timeout, self.clock.as_ref())? {
            Some(status) => {
                debug!(program, code = status.code(), "probe command finished");
            }
            None => {
                warn!(
                    program,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "probe command timed out, killing it"
                );
                // Already-exited is fine here; we only need the process gone
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        let mut stdout = String::new();
        File::open(stdout_file.path())?.read_to_string(&mut stdout)?;

        Ok(first_token(&stdout))
    }
}

/// First whitespace-delimited token, or empty
pub fn first_token(output: &str) -> String {
    output
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Poll `try_wait` until the child exits or the timeout elapses
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    clock: &dyn Clock,
) -> Result<Option<ExitStatus>> {
    let start = clock.now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if clock.now().duration_since(start) >= timeout {
                    return Ok(None);
                }
                clock.sleep(WAIT_POLL_INTERVAL);
            }
            Err(e) => {
                // Try to clean up anyway to avoid leaving an orphan
                let _ = child.kill();
                let _ = child.wait();
                return Err(TbError::CommandFailed(format!(
                    "Failed to monitor child process: {}",
                    e
                )));
            }
        }
    }
}
