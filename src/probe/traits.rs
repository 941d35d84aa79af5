/// Readiness probe abstraction - the orchestrator only ever talks to this trait
use crate::docker::ServiceHandle;
use crate::errors::Result;

/// Outcome of one probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Not usable yet; the string says why
    NotReady(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn from_bool(ready: bool, reason: &str) -> Self {
        if ready {
            Readiness::Ready
        } else {
            Readiness::NotReady(reason.to_string())
        }
    }
}

/// Trait that all readiness checks must implement
///
/// A probe only reads service state. `Err` means the check itself could not
/// run (spawn failure, I/O error); the poll loop treats it like `NotReady`
/// and retries until the service's deadline.
pub trait ReadinessProbe: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn check(&self, handle: &ServiceHandle) -> Result<Readiness>;
}

/// Closures work as ad-hoc probes
pub struct FnProbe<F> {
    name: String,
    check: F,
}

impl<F> FnProbe<F>
where
    F: Fn(&ServiceHandle) -> Result<Readiness> + Send + Sync,
{
    pub fn new(name: &str, check: F) -> Self {
        Self {
            name: name.to_string(),
            check,
        }
    }
}

impl<F> ReadinessProbe for FnProbe<F>
where
    F: Fn(&ServiceHandle) -> Result<Readiness> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, handle: &ServiceHandle) -> Result<Readiness> {
        (self.check)(handle)
    }
}
