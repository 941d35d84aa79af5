use crate::errors::{Result, TbError};
use crate::policy::FailureMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "testbed.yml";

/// Overrides the configured project namespace, e.g. to isolate parallel CI jobs
pub const PROJECT_ENV: &str = "TESTBED_PROJECT";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
    #[serde(default = "default_project")]
    pub project: String,
    /// Explicit compose invocation, e.g. `["docker", "compose"]`. Auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_command: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub pull_on_startup: bool,
    #[serde(default)]
    pub keep_containers: bool,
    #[serde(default)]
    pub failure_mode: FailureMode,
    #[serde(default = "default_poll_interval", deserialize_with = "deserialize_duration")]
    pub poll_interval: String,
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: String,
    #[serde(default = "default_command_timeout", deserialize_with = "deserialize_duration")]
    pub command_timeout: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Directory the config was loaded from; relative paths resolve against it
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub ports_open: bool,
    /// Deep readiness command; the container id is appended as its last argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Addresses (`host:port`) that must accept a TCP connection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp: Vec<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<String>,
}

fn default_compose_file() -> String {
    "docker-compose.yaml".to_string()
}

fn default_project() -> String {
    "integration".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_timeout() -> String {
    "2m".to_string()
}

fn default_command_timeout() -> String {
    "30s".to_string()
}

/// Durations may be written as "30s"-style strings or bare seconds
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Text(String),
    Seconds(u64),
}

impl RawDuration {
    fn into_string(self) -> String {
        match self {
            RawDuration::Text(text) => text,
            RawDuration::Seconds(seconds) => seconds.to_string(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    RawDuration::deserialize(deserializer).map(RawDuration::into_string)
}

fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<RawDuration>::deserialize(deserializer)?.map(RawDuration::into_string))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compose_file: default_compose_file(),
            project: default_project(),
            compose_command: None,
            pull_on_startup: true,
            keep_containers: false,
            failure_mode: FailureMode::default(),
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
            command_timeout: default_command_timeout(),
            services: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load config from testbed.yml in the given directory
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            let mut config = Config::default();
            config.base_dir = dir.to_path_buf();
            return Ok(config);
        }

        Self::load_file(&config_path)
    }

    /// Load config from an explicit file path
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TbError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Config = serde_yml::from_str(&content)
            .map_err(|e| TbError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;

        Ok(config)
    }

    /// Find the nearest ancestor directory containing testbed.yml
    pub fn find_project_root(start_path: &Path) -> Result<PathBuf> {
        let mut current = start_path;

        loop {
            if current.join(CONFIG_FILE_NAME).exists() {
                return Ok(current.to_path_buf());
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => {
                    return Err(TbError::ConfigError(format!(
                        "No {} found in {} or any parent directory",
                        CONFIG_FILE_NAME,
                        start_path.display()
                    )))
                }
            }
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(project) = std::env::var(PROJECT_ENV) {
            if !project.trim().is_empty() {
                self.project = project.trim().to_string();
            }
        }
    }

    /// Absolute (or base-relative) path of the compose file
    pub fn compose_path(&self) -> PathBuf {
        let path = Path::new(&self.compose_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration(&self.poll_interval)
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout)
    }

    pub fn command_timeout(&self) -> Result<Duration> {
        parse_duration(&self.command_timeout)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(TbError::ConfigError(
                    "Service name must not be empty".to_string(),
                ));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(TbError::ConfigError(format!(
                    "Service '{}' is declared more than once",
                    service.name
                )));
            }
            if let Some(timeout) = &service.timeout {
                parse_duration(timeout)?;
            }
        }

        self.poll_interval()?;
        self.timeout()?;
        self.command_timeout()?;

        Ok(())
    }
}

/// Parse a duration string such as "500ms", "30s", "2m" or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || TbError::ConfigError(format!("Invalid duration value: {}", value));

    if let Some(num_str) = value.strip_suffix("ms") {
        num_str
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| invalid())
    } else if let Some(num_str) = value.strip_suffix('s') {
        num_str
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| invalid())
    } else if let Some(num_str) = value.strip_suffix('m') {
        let minutes = num_str.trim().parse::<u64>().map_err(|_| invalid())?;
        minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        // Bare numbers are seconds
        value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| invalid())
    }
}
