// Built-in readiness checks: published ports, scripted deep checks, raw TCP

use crate::docker::ports::{self, CONNECT_TIMEOUT};
use crate::docker::ServiceHandle;
use crate::errors::Result;
use crate::probe::traits::{Readiness, ReadinessProbe};
use crate::runner::CommandRunner;
use std::path::{Path, PathBuf};

/// Token a readiness script prints once the service is internally ready
pub const READY_TOKEN: &str = "1";

/// Every published port of the service accepts TCP connections
#[derive(Debug, Clone, Copy, Default)]
pub struct PortsOpen;

impl ReadinessProbe for PortsOpen {
    fn name(&self) -> &str {
        "ports-open"
    }

    fn check(&self, handle: &ServiceHandle) -> Result<Readiness> {
        let closed = ports::closed_ports(&handle.ports);
        if closed.is_empty() {
            return Ok(Readiness::Ready);
        }

        let addresses: Vec<String> = closed.iter().map(|p| p.address()).collect();
        Ok(Readiness::NotReady(format!(
            "ports not open: {}",
            addresses.join(", ")
        )))
    }
}

/// Runs `command <container-id>` and expects the first token of output to be "1"
#[derive(Debug, Clone)]
pub struct ScriptProbe {
    program: String,
    args: Vec<String>,
    runner: CommandRunner,
    base_dir: Option<PathBuf>,
}

impl ScriptProbe {
    /// `command` is split on whitespace; no shell quoting is applied
    pub fn new(command: &str, runner: CommandRunner) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
            runner,
            base_dir: None,
        }
    }

    /// Resolve a relative script path like `./ready.sh` against `dir` instead of
    /// the process's working directory. Bare names are still looked up on PATH.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn program_path(&self) -> PathBuf {
        let program = Path::new(&self.program);
        match &self.base_dir {
            Some(dir) if program.is_relative() && program.components().count() > 1 => {
                dir.join(program)
            }
            _ => program.to_path_buf(),
        }
    }
}

impl ReadinessProbe for ScriptProbe {
    fn name(&self) -> &str {
        &self.program
    }

    fn check(&self, handle: &ServiceHandle) -> Result<Readiness> {
        let id = match &handle.container_id {
            Some(id) => id,
            None => return Ok(Readiness::NotReady("no id on container".to_string())),
        };

        let mut args = self.args.clone();
        args.push(id.clone());

        let program = self.program_path();
        let token = self.runner.execute(&program.to_string_lossy(), &args)?;
        if token.eq_ignore_ascii_case(READY_TOKEN) {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::NotReady(format!(
                "not ready yet (script printed '{}')",
                token
            )))
        }
    }
}

/// A fixed `host:port` accepts a TCP connection
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }
}

impl ReadinessProbe for TcpProbe {
    fn name(&self) -> &str {
        &self.address
    }

    fn check(&self, _handle: &ServiceHandle) -> Result<Readiness> {
        Ok(Readiness::from_bool(
            ports::is_open(&self.address, CONNECT_TIMEOUT),
            "connection refused",
        ))
    }
}
