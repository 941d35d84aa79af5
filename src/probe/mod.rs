pub mod checks;
pub mod poll;
pub mod traits;

pub use checks::{PortsOpen, ScriptProbe, TcpProbe, READY_TOKEN};
pub use poll::{check_once, wait_until_ready, PollSettings};
pub use traits::{FnProbe, Readiness, ReadinessProbe};

use crate::config::{parse_duration, ServiceConfig};
use crate::errors::Result;
use crate::runner::CommandRunner;
use std::path::Path;
use std::time::Duration;

/// A declared service and the probes that decide when it is usable
pub struct ServiceSpec {
    name: String,
    probes: Vec<Box<dyn ReadinessProbe>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let probes: Vec<&str> = self.probes.iter().map(|p| p.name()).collect();
        f.debug_struct("ServiceSpec")
            .field("name", &self.name)
            .field("probes", &probes)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ServiceSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            probes: Vec::new(),
            timeout: None,
        }
    }

    /// Probes run in the order they were added; the first not-ready one stops the poll
    pub fn with_probe(mut self, probe: impl ReadinessProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    pub fn with_ports_open(self) -> Self {
        self.with_probe(PortsOpen)
    }

    pub fn with_script(self, command: &str, runner: CommandRunner) -> Self {
        self.with_probe(ScriptProbe::new(command, runner))
    }

    /// Override the environment-wide readiness timeout for this service
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build from a `testbed.yml` entry; relative script paths are taken from `base_dir`
    pub fn from_config(
        config: &ServiceConfig,
        runner: &CommandRunner,
        base_dir: &Path,
    ) -> Result<Self> {
        let mut spec = ServiceSpec::new(&config.name);

        if config.ports_open {
            spec = spec.with_ports_open();
        }
        for address in &config.tcp {
            spec = spec.with_probe(TcpProbe::new(address));
        }
        if let Some(script) = &config.script {
            let probe = ScriptProbe::new(script, runner.clone()).with_base_dir(base_dir);
            spec = spec.with_probe(probe);
        }
        if let Some(timeout) = &config.timeout {
            spec = spec.with_timeout(parse_duration(timeout)?);
        }

        Ok(spec)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probes(&self) -> &[Box<dyn ReadinessProbe>] {
        &self.probes
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_orders_cheap_checks_first() {
        let config = ServiceConfig {
            name: "broker".to_string(),
            ports_open: true,
            script: Some("scripts/is-broker-ready.sh --quiet".to_string()),
            tcp: vec!["127.0.0.1:5672".to_string()],
            timeout: Some("45s".to_string()),
        };

        let spec = ServiceSpec::from_config(&config, &CommandRunner::default(), Path::new("."))
                .unwrap();
        let names: Vec<&str> = spec.probes().iter().map(|p| p.name()).collect();

        assert_eq!(spec.name(), "broker");
        assert_eq!(
            names,
            vec!["ports-open", "127.0.0.1:5672", "scripts/is-broker-ready.sh"]
        );
        assert_eq!(spec.timeout(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_from_config_without_checks() {
        let config = ServiceConfig {
            name: "api".to_string(),
            ports_open: false,
            script: None,
            tcp: Vec::new(),
            timeout: None,
        };

        let spec = ServiceSpec::from_config(&config, &CommandRunner::default(), Path::new("."))
                .unwrap();
        assert!(spec.probes().is_empty());
        assert_eq!(spec.timeout(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_script_resolves_next_to_config() {
        use crate::config::{Config, CONFIG_FILE_NAME};
        use crate::docker::ServiceHandle;
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("ready.sh");
        std::fs::write(&script, "#!/bin/sh\necho 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "services:\n  - name: db\n    ports_open: false\n    script: ./ready.sh\n",
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        let spec = ServiceSpec::from_config(
            &config.services[0],
            &CommandRunner::default(),
            &config.base_dir,
        )
        .unwrap();

        let handle = ServiceHandle {
            service: "db".to_string(),
            container_id: Some("abc123".to_string()),
            running: true,
            ports: Vec::new(),
        };
        assert!(spec.probes()[0].check(&handle).unwrap().is_ready());
    }
}
