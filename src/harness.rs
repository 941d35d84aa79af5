//! Wiring for test suites.
//!
//! A test binary shares one [`Orchestrator`] across all of its tests:
//!
//! ```no_run
//! #[test]
//! fn talks_to_the_database() {
//!     let env = testbed::harness::ensure_environment().unwrap();
//!     assert_eq!(env.state(), testbed::EnvironmentState::Healthy);
//!     // ... connect to the db service
//! }
//! ```
//!
//! The first test to call [`ensure_environment`] builds the orchestrator from
//! `testbed.yml`, registers the exit hook, and runs the bring-up; every other
//! test reuses it.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::{Result, TbError};
use crate::logging;
use crate::orchestrator::Orchestrator;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};

static SHARED: Mutex<Option<Arc<Orchestrator>>> = Mutex::new(None);

/// Return the process-shared orchestrator, creating it with `init` on first use
pub fn shared<F>(init: F) -> Result<Arc<Orchestrator>>
where
    F: FnOnce() -> Result<Arc<Orchestrator>>,
{
    let mut slot = SHARED.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = slot.as_ref() {
        return Ok(existing.clone());
    }

    let orchestrator = init()?;
    *slot = Some(orchestrator.clone());
    Ok(orchestrator)
}

/// Build the shared orchestrator from the testbed.yml nearest to the current
/// directory and make sure the environment is up.
pub fn ensure_environment() -> Result<Arc<Orchestrator>> {
    let root = Config::find_project_root(&std::env::current_dir()?)?;
    ensure_environment_from(&root)
}

/// Like [`ensure_environment`] with an explicit directory holding testbed.yml
pub fn ensure_environment_from(dir: &Path) -> Result<Arc<Orchestrator>> {
    logging::init(logging::DEFAULT_DIRECTIVE);

    let orchestrator = shared(|| {
        let mut config = Config::load(dir)?;
        config.apply_env_overrides();
        Orchestrator::from_config(&config)?.build()
    })?;

    orchestrator.ensure_ready()?;
    Ok(orchestrator)
}

/// Run `attempt` up to `max_attempts` times, returning the first success or the
/// last failure. Each failed attempt is logged with its number.
pub fn retry<T, E, F>(max_attempts: usize, mut attempt: F) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut(usize) -> std::result::Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    let mut run = 1;

    loop {
        match attempt(run) {
            Ok(value) => return Ok(value),
            Err(e) if run < max_attempts => {
                warn!(attempt = run, max_attempts, error = %e, "attempt failed, retrying");
                run += 1;
            }
            Err(e) => {
                error!(max_attempts, error = %e, "giving up after {} failures", max_attempts);
                return Err(e);
            }
        }
    }
}

/// Block until `predicate` returns true, checking every `interval`
pub fn poll_until<F>(timeout: Duration, interval: Duration, predicate: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    poll_until_with_clock(&SystemClock, timeout, interval, predicate)
}

pub fn poll_until_with_clock<F>(
    clock: &dyn Clock,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = clock.now();

    loop {
        if predicate() {
            return Ok(());
        }

        let elapsed = clock.now().duration_since(start);
        if elapsed >= timeout {
            return Err(TbError::Timeout {
                what: "condition".to_string(),
                elapsed,
            });
        }

        clock.sleep(interval.min(timeout - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;

    #[test]
    fn test_retry_returns_first_success() {
        let mut seen = Vec::new();
        let result: std::result::Result<usize, String> = retry(3, |attempt| {
            seen.push(attempt);
            if attempt < 2 {
                Err(format!("attempt {} failed", attempt))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result, Ok(2));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_retry_returns_last_failure() {
        let mut calls = 0;
        let result: std::result::Result<(), String> = retry(3, |attempt| {
            calls += 1;
            Err(format!("failure {}", attempt))
        });

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_zero_attempts_still_runs_once() {
        let mut calls = 0;
        let _: std::result::Result<(), &str> = retry(0, |_| {
            calls += 1;
            Err("nope")
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_poll_until_succeeds() {
        let clock = FakeClock::new();
        let mut checks = 0;
        poll_until_with_clock(
            &clock,
            Duration::from_secs(10),
            Duration::from_secs(1),
            || {
                checks += 1;
                checks == 4
            },
        )
        .unwrap();

        assert_eq!(checks, 4);
        assert_eq!(clock.sleep_count(), 3);
    }

    #[test]
    fn test_poll_until_times_out() {
        let clock = FakeClock::new();
        let err = poll_until_with_clock(
            &clock,
            Duration::from_millis(2500),
            Duration::from_secs(1),
            || false,
        )
        .unwrap_err();

        match err {
            TbError::Timeout { elapsed, .. } => assert_eq!(elapsed, Duration::from_millis(2500)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_poll_until_real_clock() {
        let start = std::time::Instant::now();
        poll_until(Duration::from_secs(5), Duration::from_millis(10), || {
            start.elapsed() >= Duration::from_millis(30)
        })
        .unwrap();
    }
}
