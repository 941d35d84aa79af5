// Shutdown and failure policies, resolved once per orchestrator

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Set to `true` to keep containers alive after the run
pub const KEEP_DOCKER_ENV: &str = "TESTBED_KEEP_DOCKER";

/// Whether teardown actually stops the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Leave containers running for the next local iteration
    Skip,
    /// Stop and remove every container in the project namespace
    #[default]
    Graceful,
}

impl ShutdownPolicy {
    pub fn from_flag(keep_containers: bool) -> Self {
        if keep_containers {
            ShutdownPolicy::Skip
        } else {
            ShutdownPolicy::Graceful
        }
    }

    /// Resolve from the config flag, letting `TESTBED_KEEP_DOCKER` override it
    pub fn resolve(keep_containers: bool) -> Self {
        let keep = match std::env::var(KEEP_DOCKER_ENV) {
            Ok(value) => value.trim().eq_ignore_ascii_case("true"),
            Err(_) => keep_containers,
        };

        let policy = Self::from_flag(keep);
        if policy == ShutdownPolicy::Skip {
            warn!(
                "Keeping the containers after the tests. Do NOT use this option in a CI environment, \
                 it is meant to speed up repeatedly running tests in development only."
            );
        }
        policy
    }
}

/// What happens when bring-up fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Log the cause and exit the process with a non-zero status
    #[default]
    Strict,
    /// Return the failure to the caller
    Lenient,
}
