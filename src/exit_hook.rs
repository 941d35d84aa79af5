// Run teardown once when the process exits normally
//
// Handlers registered here run when `main` returns or `std::process::exit` is
// called. They do NOT run on SIGKILL or other forceful termination; in that
// case containers are left behind and must be removed out of band
// (e.g. `tb down` or `docker compose -p <project> down`).

use crate::orchestrator::Orchestrator;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tracing::{error, warn};

static TARGET: OnceLock<Arc<Orchestrator>> = OnceLock::new();

/// Register `orchestrator` for teardown at process exit.
///
/// Only the first registration in a process takes effect; later calls return
/// `false` and leave the existing registration in place.
pub fn register(orchestrator: Arc<Orchestrator>) -> bool {
    if TARGET.set(orchestrator).is_err() {
        return false;
    }
    install()
}

/// The orchestrator that will be torn down at exit, if any
pub fn registered() -> Option<Arc<Orchestrator>> {
    TARGET.get().cloned()
}

/// Tear down the registered orchestrator now. Never panics.
pub fn run() {
    let Some(orchestrator) = TARGET.get() else {
        return;
    };

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| orchestrator.teardown()));
    if outcome.is_err() {
        error!("Docker container shutdown hook panicked");
    }
}

#[cfg(unix)]
fn install() -> bool {
    extern "C" fn run_at_exit() {
        run();
    }

    // SAFETY: `run_at_exit` is a plain function with no captured state and it
    // never unwinds across the FFI boundary (`run` catches panics).
    let rc = unsafe { libc::atexit(run_at_exit) };
    if rc != 0 {
        warn!("Failed to register exit hook, containers will not be removed at exit");
        return false;
    }
    true
}

#[cfg(not(unix))]
fn install() -> bool {
    warn!("Exit hooks are not supported on this platform, containers will not be removed at exit");
    false
}
