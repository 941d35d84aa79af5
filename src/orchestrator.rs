// Environment orchestrator: one bring-up per process, best-effort teardown
//
// State machine:
//   NotStarted -> Starting -> Healthy | Failed -> TornDown
//   NotStarted -> TornDown (teardown before anything was started)

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::docker::{ComposeBackend, ComposeProject};
use crate::errors::{Result, TbError};
use crate::exit_hook;
use crate::policy::{FailureMode, ShutdownPolicy};
use crate::probe::{self, PollSettings, ServiceSpec};
use crate::runner::CommandRunner;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info, warn};

/// Lifecycle of the dependency stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    NotStarted,
    Starting,
    Healthy,
    Failed,
    TornDown,
}

impl EnvironmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentState::NotStarted => "not-started",
            EnvironmentState::Starting => "starting",
            EnvironmentState::Healthy => "healthy",
            EnvironmentState::Failed => "failed",
            EnvironmentState::TornDown => "torn-down",
        }
    }
}

struct Inner {
    state: EnvironmentState,
    /// Cause of the last bring-up failure, replayed to later callers
    failure: Option<String>,
    /// Number of bring-up sequences actually executed (0 or 1)
    bring_ups: usize,
    /// Number of stop/remove actions actually issued (0 or 1)
    cleanups: usize,
}

/// Owns the compose environment and its declared services.
///
/// Construct it once per process and share it (`Arc`) with every test that
/// needs the stack. Only the first `ensure_ready` call runs the bring-up;
/// concurrent callers block until it finishes and then see the same result.
pub struct Orchestrator {
    backend: Arc<dyn ComposeBackend>,
    services: Vec<ServiceSpec>,
    settings: PollSettings,
    policy: ShutdownPolicy,
    failure_mode: FailureMode,
    pull_on_startup: bool,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("project", &self.backend.project())
            .field("services", &self.services)
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .field("failure_mode", &self.failure_mode)
            .field("state", &self.state())
            .finish()
    }
}

impl Orchestrator {
    pub fn builder(backend: Arc<dyn ComposeBackend>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(backend)
    }

    /// Build an orchestrator for `config` backed by the real `docker compose`.
    /// The shutdown policy is resolved here, once, including the env override.
    pub fn from_config(config: &Config) -> Result<OrchestratorBuilder> {
        let backend = Arc::new(ComposeProject::new(config)?);
        let runner = CommandRunner::new(config.command_timeout()?);

        let services = config
            .services
            .iter()
            .map(|service| ServiceSpec::from_config(service, &runner, &config.base_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(OrchestratorBuilder::new(backend)
            .services(services)
            .poll_settings(PollSettings {
                interval: config.poll_interval()?,
                timeout: config.timeout()?,
            })
            .shutdown_policy(ShutdownPolicy::resolve(config.keep_containers))
            .failure_mode(config.failure_mode)
            .pull_on_startup(config.pull_on_startup))
    }

    pub fn state(&self) -> EnvironmentState {
        self.lock().state
    }

    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn project(&self) -> &str {
        self.backend.project()
    }

    pub fn backend(&self) -> &dyn ComposeBackend {
        self.backend.as_ref()
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Result<&ServiceSpec> {
        self.services
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| TbError::UnknownService(name.to_string()))
    }

    /// How many times the bring-up sequence has run
    pub fn bring_up_count(&self) -> usize {
        self.lock().bring_ups
    }

    /// How many times containers were actually stopped and removed
    pub fn cleanup_count(&self) -> usize {
        self.lock().cleanups
    }

    /// Bring the environment up if needed and wait until every service is ready.
    ///
    /// In strict mode a failed bring-up is logged and the process exits with
    /// status 1; in lenient mode the failure is returned to every caller.
    pub fn ensure_ready(&self) -> Result<()> {
        let result = self.ensure_ready_inner();

        if let Err(e) = &result {
            if self.failure_mode == FailureMode::Strict {
                exit_after_failure(e);
            }
        }

        result
    }

    fn ensure_ready_inner(&self) -> Result<()> {
        let mut inner = self.lock();

        loop {
            match inner.state {
                EnvironmentState::Healthy => return Ok(()),
                EnvironmentState::Failed => {
                    let cause = inner
                        .failure
                        .clone()
                        .unwrap_or_else(|| "unknown cause".to_string());
                    return Err(TbError::BringUpFailed(cause));
                }
                EnvironmentState::TornDown => return Err(TbError::TornDown),
                EnvironmentState::Starting => {
                    inner = self
                        .changed
                        .wait(inner)
                        .unwrap_or_else(|e| e.into_inner());
                }
                EnvironmentState::NotStarted => {
                    inner.state = EnvironmentState::Starting;
                    inner.bring_ups += 1;
                    break;
                }
            }
        }

        // This caller owns the bring-up; run it without holding the lock
        drop(inner);
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.bring_up()))
            .unwrap_or_else(|_| Err(TbError::BringUpFailed("bring-up panicked".to_string())));

        let mut inner = self.lock();
        let result = match outcome {
            Ok(()) => {
                inner.state = EnvironmentState::Healthy;
                Ok(())
            }
            Err(e) => {
                inner.state = EnvironmentState::Failed;
                inner.failure = Some(e.to_string());
                Err(TbError::BringUpFailed(e.to_string()))
            }
        };
        self.changed.notify_all();

        result
    }

    fn bring_up(&self) -> Result<()> {
        let start = self.clock.now();
        info!(project = self.project(), "Starting docker environment");

        if self.pull_on_startup {
            if let Err(e) = self.backend.pull() {
                // Images may already be present locally
                warn!(error = %e, "Failed to pull images, continuing with local images");
            }
        }

        self.backend.up()?;
        self.wait_for_services()?;

        let elapsed = self.clock.now().duration_since(start);
        info!(
            project = self.project(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Started docker in {}ms",
            elapsed.as_millis()
        );
        Ok(())
    }

    /// Poll every service concurrently; the first failure (in declaration order) wins
    fn wait_for_services(&self) -> Result<()> {
        let backend = self.backend.as_ref();
        let clock = self.clock.as_ref();
        let settings = &self.settings;

        let results: Vec<Result<Duration>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .services
                .iter()
                .map(|spec| {
                    scope.spawn(move || probe::wait_until_ready(spec, backend, settings, clock))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(TbError::BringUpFailed(
                            "readiness poller panicked".to_string(),
                        ))
                    })
                })
                .collect()
        });

        for result in results {
            if let Err(e) = result {
                error!(error = %e, "Environment bring-up failed");
                return Err(e);
            }
        }

        Ok(())
    }

    /// Stop the environment according to the shutdown policy.
    ///
    /// Idempotent and safe to call from the exit hook: waits for an in-flight
    /// bring-up to settle, performs the stop/remove action at most once, and
    /// logs instead of failing when the action errors.
    pub fn teardown(&self) {
        self.teardown_with(self.policy);
    }

    /// Like [`Orchestrator::teardown`] but with an explicit policy
    pub fn teardown_with(&self, policy: ShutdownPolicy) {
        let mut inner = self.lock();

        while inner.state == EnvironmentState::Starting {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }

        let previous = inner.state;
        if previous == EnvironmentState::TornDown {
            return;
        }

        inner.state = EnvironmentState::TornDown;
        self.changed.notify_all();

        if previous == EnvironmentState::NotStarted {
            info!(project = self.project(), "Environment was never started, nothing to tear down");
            return;
        }

        if policy == ShutdownPolicy::Skip {
            info!(
                project = self.project(),
                "Shutdown policy is skip, leaving containers running"
            );
            return;
        }

        // Held across the stop so a concurrent caller can't observe a half-removed stack
        inner.cleanups += 1;
        info!(project = self.project(), "Stopping docker environment");
        match self.backend.down() {
            Ok(()) => info!(project = self.project(), "Docker environment removed"),
            Err(e) => error!(
                project = self.project(),
                error = %e,
                "Failed to tear down docker environment"
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking prober must not wedge teardown
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Log the cause and exit with status 1. Concurrent failing callers queue on
/// the lock so `exit` is only ever entered once.
fn exit_after_failure(cause: &TbError) -> ! {
    static EXITING: Mutex<()> = Mutex::new(());
    let _guard = EXITING.lock().unwrap_or_else(|e| e.into_inner());

    error!(error = %cause, "Docker failed, exiting...");
    std::process::exit(1);
}

/// Configures an [`Orchestrator`]
pub struct OrchestratorBuilder {
    backend: Arc<dyn ComposeBackend>,
    services: Vec<ServiceSpec>,
    settings: PollSettings,
    policy: ShutdownPolicy,
    failure_mode: FailureMode,
    pull_on_startup: bool,
    clock: Arc<dyn Clock>,
    register_exit_hook: bool,
}

impl OrchestratorBuilder {
    pub fn new(backend: Arc<dyn ComposeBackend>) -> Self {
        Self {
            backend,
            services: Vec::new(),
            settings: PollSettings::default(),
            policy: ShutdownPolicy::default(),
            failure_mode: FailureMode::default(),
            pull_on_startup: true,
            clock: Arc::new(SystemClock),
            register_exit_hook: true,
        }
    }

    pub fn service(mut self, spec: ServiceSpec) -> Self {
        self.services.push(spec);
        self
    }

    pub fn services(mut self, specs: Vec<ServiceSpec>) -> Self {
        self.services.extend(specs);
        self
    }

    pub fn poll_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn pull_on_startup(mut self, pull: bool) -> Self {
        self.pull_on_startup = pull;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether to run `teardown` at normal process exit (default: yes)
    pub fn register_exit_hook(mut self, register: bool) -> Self {
        self.register_exit_hook = register;
        self
    }

    pub fn build(self) -> Result<Arc<Orchestrator>> {
        let mut seen = std::collections::HashSet::new();
        for spec in &self.services {
            if !seen.insert(spec.name().to_string()) {
                return Err(TbError::ConfigError(format!(
                    "Service '{}' is declared more than once",
                    spec.name()
                )));
            }
        }

        let orchestrator = Arc::new(Orchestrator {
            backend: self.backend,
            services: self.services,
            settings: self.settings,
            policy: self.policy,
            failure_mode: self.failure_mode,
            pull_on_startup: self.pull_on_startup,
            clock: self.clock,
            inner: Mutex::new(Inner {
                state: EnvironmentState::NotStarted,
                failure: None,
                bring_ups: 0,
                cleanups: 0,
            }),
            changed: Condvar::new(),
        });

        if self.register_exit_hook && !exit_hook::register(orchestrator.clone()) {
            warn!("An exit hook is already registered; this orchestrator will not be torn down at exit");
        }

        Ok(orchestrator)
    }
}
