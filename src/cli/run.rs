use crate::cli::GlobalArgs;
use crate::errors::{Result, TbError};
use std::process::Command;
use tracing::info;

/// Bring the environment up, run `command`, then tear down per policy.
/// Returns the command's exit code.
pub fn run(args: &GlobalArgs, command: &[String]) -> Result<i32> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| TbError::CommandFailed("No command given".to_string()))?;

    // The exit hook covers strict-mode exits and early returns
    let orchestrator = args.orchestrator(true)?;
    orchestrator.ensure_ready()?;

    info!(command = %command.join(" "), "Running command against the environment");
    let status = Command::new(program).args(rest).status();

    orchestrator.teardown();

    let status = status
        .map_err(|e| TbError::CommandFailed(format!("Failed to run '{}': {}", program, e)))?;
    Ok(status.code().unwrap_or(1))
}
