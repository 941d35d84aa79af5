use anyhow::Context;
use clap::{Parser, Subcommand};
use testbed::cli::{self, GlobalArgs};
use testbed::logging;

#[derive(Parser)]
#[command(name = "tb")]
#[command(about = "Docker Compose dependency stacks for integration tests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the environment and wait until every service is ready
    Up,
    /// Stop and remove the environment's containers
    Down,
    /// Show the container state of every declared service
    Status,
    /// Run one round of readiness probes for a service
    Probe {
        /// Service name as declared in testbed.yml
        service: String,
    },
    /// Start the environment, run a command, then tear down
    Run {
        /// Command to run, e.g. `tb run -- cargo test`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(logging::DEFAULT_DIRECTIVE);

    match cli.command {
        Commands::Up => cli::up::run(&cli.global).context("tb up failed")?,
        Commands::Down => cli::down::run(&cli.global).context("tb down failed")?,
        Commands::Status => cli::status::run(&cli.global).context("tb status failed")?,
        Commands::Probe { service } => {
            cli::probe::run(&cli.global, &service).context("tb probe failed")?
        }
        Commands::Run { command } => {
            let code = cli::run::run(&cli.global, &command).context("tb run failed")?;
            // Exit hook handlers still run on this path
            std::process::exit(code);
        }
    }

    Ok(())
}
