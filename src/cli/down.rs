use crate::cli::GlobalArgs;
use crate::errors::Result;

/// Stop and remove the project's containers, e.g. ones left by a killed run
pub fn run(args: &GlobalArgs) -> Result<()> {
    let orchestrator = args.orchestrator(false)?;

    println!("Stopping environment '{}'...", orchestrator.project());
    orchestrator.backend().down()?;
    println!("✓ Environment '{}' removed", orchestrator.project());

    Ok(())
}
