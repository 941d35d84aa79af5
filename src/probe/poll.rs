// Poll a service's probes until it is ready or its deadline passes

use crate::clock::Clock;
use crate::docker::ComposeBackend;
use crate::errors::{Result, TbError};
use crate::probe::traits::Readiness;
use crate::probe::ServiceSpec;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Poll cadence and default per-service deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Run every probe of `spec` once against the service's current container
pub fn check_once(spec: &ServiceSpec, backend: &dyn ComposeBackend) -> Result<Readiness> {
    let handle = backend.inspect(spec.name())?;

    if handle.container_id.is_none() {
        return Ok(Readiness::NotReady("no id on container".to_string()));
    }

    if !handle.running {
        debug!(service = spec.name(), "container is down, starting it");
        backend.start_service(spec.name())?;
        return Ok(Readiness::NotReady("container not running".to_string()));
    }

    for probe in spec.probes() {
        if let Readiness::NotReady(reason) = probe.check(&handle)? {
            return Ok(Readiness::NotReady(format!("{}: {}", probe.name(), reason)));
        }
    }

    Ok(Readiness::Ready)
}

/// Block until `spec` is ready, returning how long it took.
///
/// The first poll happens immediately. Not-ready results and probe errors are
/// retried every `settings.interval`; once the service's timeout has elapsed
/// without success this returns [`TbError::ProbeTimeout`].
pub fn wait_until_ready(
    spec: &ServiceSpec,
    backend: &dyn ComposeBackend,
    settings: &PollSettings,
    clock: &dyn Clock,
) -> Result<Duration> {
    let timeout = spec.timeout().unwrap_or(settings.timeout);
    let start = clock.now();
    let mut last_reason = String::from("never polled");

    loop {
        match check_once(spec, backend) {
            Ok(Readiness::Ready) => {
                let elapsed = clock.now().duration_since(start);
                info!(
                    service = spec.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "service is ready"
                );
                return Ok(elapsed);
            }
            Ok(Readiness::NotReady(reason)) => {
                debug!(service = spec.name(), %reason, "service not ready");
                last_reason = reason;
            }
            Err(e) => {
                debug!(service = spec.name(), error = %e, "readiness check failed");
                last_reason = e.to_string();
            }
        }

        let elapsed = clock.now().duration_since(start);
        if elapsed >= timeout {
            warn!(
                service = spec.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                last = %last_reason,
                "service did not become ready"
            );
            return Err(TbError::ProbeTimeout {
                service: spec.name().to_string(),
                elapsed,
            });
        }

        clock.sleep(settings.interval.min(timeout - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::clock::SystemClock;
    use crate::docker::container::test_support::FakeCompose;
    use crate::docker::ServiceHandle;
    use crate::probe::FnProbe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn settings(interval_ms: u64, timeout_ms: u64) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_ready_on_first_poll_does_not_sleep() {
        let backend = FakeCompose::new().with_service("db");
        let spec = ServiceSpec::new("db").with_probe(FnProbe::new("ok", |_| Ok(Readiness::Ready)));
        let clock = FakeClock::new();

        let elapsed = wait_until_ready(&spec, &backend, &settings(1000, 10_000), &clock).unwrap();

        assert_eq!(elapsed, Duration::ZERO);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn test_retries_until_ready() {
        let backend = FakeCompose::new().with_service("db");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let spec = ServiceSpec::new("db").with_probe(FnProbe::new("third-time", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Readiness::from_bool(n >= 2, "warming up"))
        }));
        let clock = FakeClock::new();

        let elapsed = wait_until_ready(&spec, &backend, &settings(500, 10_000), &clock).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(elapsed, Duration::from_millis(1000));
    }

    #[test]
    fn test_probe_errors_are_retried() {
        let backend = FakeCompose::new().with_service("db");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let spec = ServiceSpec::new("db").with_probe(FnProbe::new("flaky", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TbError::CommandFailed("spawn failed".to_string()))
            } else {
                Ok(Readiness::Ready)
            }
        }));
        let clock = FakeClock::new();

        assert!(wait_until_ready(&spec, &backend, &settings(100, 1000), &clock).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_never_ready_times_out_at_deadline() {
        let backend = FakeCompose::new().with_service("audio");
        let spec = ServiceSpec::new("audio")
            .with_probe(FnProbe::new("never", |_| Ok(Readiness::NotReady("0".to_string()))));
        let clock = FakeClock::new();

        let err = wait_until_ready(&spec, &backend, &settings(300, 1000), &clock).unwrap_err();

        match err {
            TbError::ProbeTimeout { service, elapsed } => {
                assert_eq!(service, "audio");
                // Last sleep is clamped to the deadline
                assert_eq!(elapsed, Duration::from_millis(1000));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_is_bounded_in_real_time() {
        let backend = FakeCompose::new().with_service("audio");
        let spec = ServiceSpec::new("audio")
            .with_probe(FnProbe::new("never", |_| Ok(Readiness::NotReady("0".to_string()))));

        let start = Instant::now();
        let result = wait_until_ready(&spec, &backend, &settings(50, 300), &SystemClock);
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(TbError::ProbeTimeout { .. })));
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[test]
    fn test_service_timeout_overrides_default() {
        let backend = FakeCompose::new().with_service("db");
        let spec = ServiceSpec::new("db")
            .with_timeout(Duration::from_millis(200))
            .with_probe(FnProbe::new("never", |_| Ok(Readiness::NotReady("no".to_string()))));
        let clock = FakeClock::new();

        let err = wait_until_ready(&spec, &backend, &settings(100, 60_000), &clock).unwrap_err();
        assert!(matches!(err, TbError::ProbeTimeout { elapsed, .. } if elapsed == Duration::from_millis(200)));
    }

    #[test]
    fn test_missing_container_is_not_ready() {
        let backend = FakeCompose::new();
        let spec = ServiceSpec::new("db");
        assert_eq!(
            check_once(&spec, &backend).unwrap(),
            Readiness::NotReady("no id on container".to_string())
        );
    }

    #[test]
    fn test_stopped_container_is_started() {
        let backend = FakeCompose::new();
        backend.set_handle(ServiceHandle {
            service: "api".to_string(),
            container_id: Some("c1".to_string()),
            running: false,
            ports: Vec::new(),
        });
        let spec = ServiceSpec::new("api");

        assert!(!check_once(&spec, &backend).unwrap().is_ready());
        assert_eq!(backend.starts(), 1);
        assert!(check_once(&spec, &backend).unwrap().is_ready());
    }

    #[test]
    fn test_first_failing_probe_short_circuits() {
        let backend = FakeCompose::new().with_service("db");
        let deep_calls = Arc::new(AtomicUsize::new(0));
        let counter = deep_calls.clone();
        let spec = ServiceSpec::new("db")
            .with_probe(FnProbe::new("ports", |_| {
                Ok(Readiness::NotReady("closed".to_string()))
            }))
            .with_probe(FnProbe::new("deep", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Readiness::Ready)
            }));

        assert_eq!(
            check_once(&spec, &backend).unwrap(),
            Readiness::NotReady("ports: closed".to_string())
        );
        assert_eq!(deep_calls.load(Ordering::SeqCst), 0);
    }
}
