pub mod down;
pub mod probe;
pub mod run;
pub mod status;
pub mod up;

use crate::config::Config;
use crate::errors::Result;
use crate::orchestrator::{Orchestrator, OrchestratorBuilder};
use crate::policy::{FailureMode, ShutdownPolicy};
use clap::Args;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to testbed.yml (default: nearest one above the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Leave containers running after teardown (local iteration only, never CI)
    #[arg(long, global = true)]
    pub keep: bool,

    /// Report bring-up failures as errors instead of exiting immediately
    #[arg(long, global = true)]
    pub lenient: bool,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_file(path)?,
            None => {
                let root = Config::find_project_root(&env::current_dir()?)?;
                Config::load(&root)?
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build an orchestrator honouring the command-line overrides
    pub fn orchestrator(&self, register_exit_hook: bool) -> Result<Arc<Orchestrator>> {
        self.builder(register_exit_hook)?.build()
    }

    pub fn builder(&self, register_exit_hook: bool) -> Result<OrchestratorBuilder> {
        let config = self.load_config()?;
        let mut builder =
            Orchestrator::from_config(&config)?.register_exit_hook(register_exit_hook);

        if self.keep {
            builder = builder.shutdown_policy(ShutdownPolicy::Skip);
        }
        if self.lenient {
            builder = builder.failure_mode(FailureMode::Lenient);
        }

        Ok(builder)
    }
}
