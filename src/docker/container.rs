// Docker Compose environment handle
// Bring the project up, inspect its services, tear it down

use crate::config::Config;
use crate::docker::ports::PublishedPort;
use crate::errors::{Result, TbError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Runtime view of one compose service, handed to readiness probes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceHandle {
    pub service: String,
    pub container_id: Option<String>,
    pub running: bool,
    pub ports: Vec<PublishedPort>,
}

/// Operations the orchestrator needs from a compose environment
pub trait ComposeBackend: Send + Sync {
    /// Project namespace isolating this run's containers
    fn project(&self) -> &str;

    fn pull(&self) -> Result<()>;

    /// Create and start every service in the background
    fn up(&self) -> Result<()>;

    /// Look up the container backing `service`
    fn inspect(&self, service: &str) -> Result<ServiceHandle>;

    /// Start a stopped service container
    fn start_service(&self, service: &str) -> Result<()>;

    /// Stop and remove every container in the project
    fn down(&self) -> Result<()>;
}

/// Docker Compose command variant
#[derive(Debug, Clone, Copy)]
enum DockerComposeVariant {
    /// Legacy docker-compose (with hyphen)
    Hyphenated,
    /// Modern docker compose (no hyphen, subcommand of docker)
    Subcommand,
}

/// `docker compose` driven through the CLI
#[derive(Debug, Clone)]
pub struct ComposeProject {
    program: String,
    base_args: Vec<String>,
    project: String,
    compose_file: PathBuf,
    workdir: PathBuf,
}

impl ComposeProject {
    /// Create a compose handle from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let (program, base_args) = match &config.compose_command {
            Some(command) => {
                let (program, rest) = command.split_first().ok_or_else(|| {
                    TbError::ConfigError("compose_command must not be empty".to_string())
                })?;
                (program.clone(), rest.to_vec())
            }
            None => match Self::detect_compose_variant() {
                DockerComposeVariant::Subcommand => {
                    ("docker".to_string(), vec!["compose".to_string()])
                }
                DockerComposeVariant::Hyphenated => ("docker-compose".to_string(), Vec::new()),
            },
        };

        let project = sanitize_project_name(&config.project);
        if project.is_empty() {
            return Err(TbError::ConfigError(format!(
                "Invalid project name: '{}'",
                config.project
            )));
        }

        Ok(Self {
            program,
            base_args,
            project,
            compose_file: config.compose_path(),
            workdir: config.base_dir.clone(),
        })
    }

    /// Detect which docker-compose variant is available
    fn detect_compose_variant() -> DockerComposeVariant {
        let modern = Command::new("docker")
            .arg("compose")
            .arg("version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);

        if modern {
            return DockerComposeVariant::Subcommand;
        }

        DockerComposeVariant::Hyphenated
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    /// Full argument list: variant prefix, project scoping, then the subcommand
    fn build_args(&self, subcommand: &[&str]) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("-p".to_string());
        args.push(self.project.clone());
        args.push("-f".to_string());
        args.push(self.compose_file.to_string_lossy().to_string());
        args.extend(subcommand.iter().map(|s| s.to_string()));
        args
    }

    /// Run a compose subcommand, returning its stdout (no shell involved)
    fn run(&self, subcommand: &[&str]) -> Result<String> {
        let args = self.build_args(subcommand);
        debug!(program = %self.program, args = ?args, "running compose command");

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| {
                TbError::DockerError(format!("Failed to run '{}': {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TbError::DockerError(format!(
                "'{}' failed: {}",
                subcommand.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ComposeBackend for ComposeProject {
    fn project(&self) -> &str {
        &self.project
    }

    fn pull(&self) -> Result<()> {
        self.run(&["pull"]).map(|_| ())
    }

    fn up(&self) -> Result<()> {
        self.run(&["up", "-d"]).map(|_| ())
    }

    fn inspect(&self, service: &str) -> Result<ServiceHandle> {
        let output = self.run(&["ps", "-a", "--format", "json", service])?;
        let entries = parse_ps_output(&output)?;

        let handle = entries
            .into_iter()
            .find(|entry| entry.service == service)
            .map(PsEntry::into_handle)
            .unwrap_or_else(|| ServiceHandle {
                service: service.to_string(),
                ..ServiceHandle::default()
            });

        Ok(handle)
    }

    fn start_service(&self, service: &str) -> Result<()> {
        self.run(&["start", service]).map(|_| ())
    }

    fn down(&self) -> Result<()> {
        self.run(&["down", "--volumes", "--remove-orphans"])
            .map(|_| ())
    }
}

/// Docker Compose project names must be lowercase alphanumeric with hyphens only
pub fn sanitize_project_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Publishers", default)]
    publishers: Option<Vec<PsPublisher>>,
}

#[derive(Debug, Deserialize)]
struct PsPublisher {
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(rename = "TargetPort", default)]
    target_port: u16,
    #[serde(rename = "PublishedPort", default)]
    published_port: u16,
    #[serde(rename = "Protocol", default)]
    protocol: String,
}

impl PsEntry {
    fn into_handle(self) -> ServiceHandle {
        let ports = self
            .publishers
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.published_port != 0 && (p.protocol.is_empty() || p.protocol == "tcp"))
            .map(|p| PublishedPort {
                host: p.url,
                port: p.published_port,
                target_port: p.target_port,
            })
            .collect();

        ServiceHandle {
            service: self.service,
            container_id: if self.id.is_empty() { None } else { Some(self.id) },
            running: self.state.eq_ignore_ascii_case("running"),
            ports,
        }
    }
}

/// Parse `compose ps --format json`: older releases print one array,
/// newer ones print one object per line.
fn parse_ps_output(output: &str) -> Result<Vec<PsEntry>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| TbError::DockerError(format!("Failed to parse compose ps output: {}", e)));
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                TbError::DockerError(format!("Failed to parse compose ps output: {}", e))
            })
        })
        .collect()
}
