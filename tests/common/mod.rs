/// Common test utilities for testbed integration tests
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Stands in for `docker compose`: records every invocation in calls.log and
/// reports each requested service as a running container.
const FAKE_COMPOSE: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$@" >> "$dir/calls.log"
while [ $# -gt 0 ]; do
  case "$1" in
    -p|-f) shift 2 ;;
    *) break ;;
  esac
done
cmd="$1"
shift
case "$cmd" in
  up)
    if [ -f "$dir/fail-up" ]; then
      echo "Error response from daemon: pull access denied" >&2
      exit 1
    fi
    ;;
  ps)
    for service in "$@"; do :; done
    printf '{"ID":"%s-0123456789ab","Service":"%s","State":"running","Publishers":[]}\n' "$service" "$service"
    ;;
esac
exit 0
"#;

pub const SERVICES: [&str; 4] = ["db", "api", "broker", "audio"];

/// A temporary project directory with a fake compose binary and readiness scripts
pub struct TestEnv {
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestEnv {
    /// Four services; every one except those in `never_ready` reports "1" at once
    pub fn new(never_ready: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let env = TestEnv { temp_dir };

        env.write_executable("fake-compose.sh", FAKE_COMPOSE);
        env.write_executable("ready.sh", "#!/bin/sh\necho 1\n");
        env.write_executable("not-ready.sh", "#!/bin/sh\necho 0\n");
        std::fs::write(env.path().join("docker-compose.yaml"), "services: {}\n")
            .expect("Failed to write compose file");

        let mut yaml = format!(
            "compose_command: [\"{}\"]\nproject: integration\npoll_interval: 50ms\ntimeout: 600ms\nservices:\n",
            env.path().join("fake-compose.sh").display()
        );
        for service in SERVICES {
            let script = if never_ready.contains(&service) {
                "not-ready.sh"
            } else {
                "ready.sh"
            };
            yaml.push_str(&format!(
                "  - name: {}\n    script: \"{}\"\n",
                service,
                env.path().join(script).display()
            ));
        }
        env.create_config(&yaml);

        env
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn create_config(&self, content: &str) {
        std::fs::write(self.path().join("testbed.yml"), content)
            .expect("Failed to write config file");
    }

    pub fn write_executable(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, content).expect("Failed to write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
        path
    }

    /// Make the fake `up` fail
    pub fn fail_up(&self) {
        std::fs::write(self.path().join("fail-up"), "").expect("Failed to write marker");
    }

    /// Every recorded compose invocation, one per line
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of recorded invocations of the given compose subcommand
    pub fn count_calls(&self, subcommand: &str) -> usize {
        let needle = format!(" {}", subcommand);
        self.calls()
            .iter()
            .filter(|line| line.contains(&needle))
            .count()
    }

    /// Run tb in this directory
    pub fn tb(&self, args: &[&str]) -> CommandResult {
        self.tb_with_env(args, &[])
    }

    pub fn tb_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> CommandResult {
        let start = Instant::now();
        let output = Command::new(env!("CARGO_BIN_EXE_tb"))
            .args(args)
            .current_dir(self.path())
            .env_remove("TESTBED_KEEP_DOCKER")
            .env_remove("TESTBED_PROJECT")
            .env("RUST_LOG", "testbed=info")
            .envs(envs.iter().copied())
            .output()
            .expect("Failed to execute tb command");

        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
            elapsed: start.elapsed(),
        }
    }
}

/// Result of running a command
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

#[allow(dead_code)]
impl CommandResult {
    /// Assert the command succeeded
    pub fn assert_success(&self) {
        if !self.success {
            panic!(
                "Command failed:\nstdout: {}\nstderr: {}\nexit code: {:?}",
                self.stdout, self.stderr, self.exit_code
            );
        }
    }

    /// Assert the command failed
    pub fn assert_failure(&self) {
        if self.success {
            panic!(
                "Command succeeded when it should have failed:\nstdout: {}\nstderr: {}",
                self.stdout, self.stderr
            );
        }
    }

    /// Assert stdout contains text
    pub fn assert_stdout_contains(&self, text: &str) {
        assert!(
            self.stdout.contains(text),
            "stdout does not contain '{}'\nstdout: {}",
            text,
            self.stdout
        );
    }

    /// Assert stderr contains text
    pub fn assert_stderr_contains(&self, text: &str) {
        assert!(
            self.stderr.contains(text),
            "stderr does not contain '{}'\nstderr: {}",
            text,
            self.stderr
        );
    }
}
