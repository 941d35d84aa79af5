use crate::cli::GlobalArgs;
use crate::errors::Result;
use crate::policy::FailureMode;
use tracing::error;

/// Bring the environment up and wait for every service; containers stay running.
/// A failed bring-up removes the partial stack (unless kept) and reports the cause.
pub fn run(args: &GlobalArgs) -> Result<()> {
    // No exit hook: a healthy stack must outlive this process
    let orchestrator = args
        .builder(false)?
        .failure_mode(FailureMode::Lenient)
        .build()?;

    println!(
        "Starting environment '{}' ({} services)...",
        orchestrator.project(),
        orchestrator.services().len()
    );
    if let Err(e) = orchestrator.ensure_ready() {
        error!(error = %e, "Docker failed, removing the partial environment");
        orchestrator.teardown();
        return Err(e);
    }
    println!("✓ Environment '{}' is ready", orchestrator.project());

    Ok(())
}
