use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TbError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Docker error: {0}")]
    DockerError(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Service '{0}' is not declared in this environment")]
    UnknownService(String),

    #[error("Service '{service}' did not become ready within {}ms", .elapsed.as_millis())]
    ProbeTimeout { service: String, elapsed: Duration },

    #[error("Timed out after {}ms waiting for {what}", .elapsed.as_millis())]
    Timeout { what: String, elapsed: Duration },

    #[error("Environment bring-up failed: {0}")]
    BringUpFailed(String),

    #[error("Environment has already been torn down")]
    TornDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TbError>;
