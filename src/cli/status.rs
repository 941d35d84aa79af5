use crate::cli::GlobalArgs;
use crate::errors::Result;
use colored::*;

/// Show the container behind each declared service
pub fn run(args: &GlobalArgs) -> Result<()> {
    let orchestrator = args.orchestrator(false)?;
    let backend = orchestrator.backend();

    if orchestrator.services().is_empty() {
        println!("{}", "No services declared in testbed.yml".yellow());
        return Ok(());
    }

    println!("Project: {}", orchestrator.project().bold());
    println!("{:<15} {:<10} {:<14} PORTS", "SERVICE", "STATUS", "CONTAINER");
    println!("{}", "-".repeat(60));

    for spec in orchestrator.services() {
        let (status, container, ports) = match backend.inspect(spec.name()) {
            Ok(handle) => {
                let status = match (&handle.container_id, handle.running) {
                    (None, _) => "Missing".red(),
                    (Some(_), true) => "Running".green(),
                    (Some(_), false) => "Stopped".yellow(),
                };
                let container = handle
                    .container_id
                    .as_deref()
                    .map(|id| id.chars().take(12).collect::<String>())
                    .unwrap_or_else(|| "-".to_string());
                let ports = handle
                    .ports
                    .iter()
                    .map(|p| format!("{}->{}", p.address(), p.target_port))
                    .collect::<Vec<_>>()
                    .join(", ");
                (status, container, ports)
            }
            Err(_) => ("Unknown".red(), "-".to_string(), String::new()),
        };

        println!(
            "{:<15} {:<10} {:<14} {}",
            spec.name(),
            status,
            container,
            ports
        );
    }

    Ok(())
}
