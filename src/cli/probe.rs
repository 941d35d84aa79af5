use crate::cli::GlobalArgs;
use crate::errors::{Result, TbError};
use crate::probe::{self, Readiness};
use colored::*;

/// Run one round of a service's readiness probes
pub fn run(args: &GlobalArgs, service: &str) -> Result<()> {
    let orchestrator = args.orchestrator(false)?;
    let spec = orchestrator.service(service)?;

    match probe::check_once(spec, orchestrator.backend())? {
        Readiness::Ready => {
            println!("{} {} is ready", "✓".green(), service);
            Ok(())
        }
        Readiness::NotReady(reason) => {
            println!("{} {} is not ready: {}", "✗".red(), service, reason);
            Err(TbError::CommandFailed(format!("{} is not ready", service)))
        }
    }
}
