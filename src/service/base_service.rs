use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};

/// A long-running background service driven by its own thread.
///
/// Implementations put their loop into `run_service` and are expected to
/// watch a shutdown flag so they can exit cleanly.
pub trait BaseService: Send + 'static {
    fn name(&self) -> &str;

    fn run_service(&mut self) -> Result<()>;
}

/// Spawns a service on a dedicated thread with a panic boundary.
///
/// An uncaught panic or error inside one service is logged and ends that
/// service's thread; it never propagates and takes the other services down
/// with it. Noticing a dead critical service is the supervisor's job.
pub fn spawn_service<S: BaseService>(mut service: S) -> Result<JoinHandle<()>> {
    let name = service.name().to_string();

    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            log::info!("Service '{}' starting", name);

            let outcome = catch_unwind(AssertUnwindSafe(|| service.run_service()));

            match outcome {
                Ok(Ok(())) => log::info!("Service '{}' exited cleanly", name),
                Ok(Err(e)) => log::error!("Service '{}' exited with error: {}", name, e),
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_string());
                    log::error!("Service '{}' panicked: {}", name, reason);
                }
            }
        })
        .map_err(|e| Error::WorkerSpawnError(e.to_string()))
}
