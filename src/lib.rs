// Library interface for testbed
// Brings up a Docker Compose dependency stack once per test process,
// waits for every service to be ready, and tears it down at exit

pub mod cli;
pub mod clock;
pub mod config;
pub mod docker;
pub mod errors;
pub mod exit_hook;
pub mod harness;
pub mod logging;
pub mod orchestrator;
pub mod policy;
pub mod probe;
pub mod runner;

pub use errors::{Result, TbError};
pub use orchestrator::{EnvironmentState, Orchestrator, OrchestratorBuilder};
pub use policy::{FailureMode, ShutdownPolicy};
pub use probe::{PollSettings, Readiness, ReadinessProbe, ServiceSpec};
pub use runner::CommandRunner;
