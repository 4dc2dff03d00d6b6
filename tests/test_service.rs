use fts_scheduler::error::{Error, Result};
use fts_scheduler::service::base_service::{BaseService, spawn_service};
use fts_scheduler::service::watchdog::SignalWatchdog;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

struct TickingService {
    ticks: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl BaseService for TickingService {
    fn name(&self) -> &str {
        "ticking-service"
    }

    fn run_service(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}

struct FailingService;

impl BaseService for FailingService {
    fn name(&self) -> &str {
        "failing-service"
    }

    fn run_service(&mut self) -> Result<()> {
        Err(Error::PersistenceError("backend went away".to_string()))
    }
}

struct PanickingService;

impl BaseService for PanickingService {
    fn name(&self) -> &str {
        "panicking-service"
    }

    fn run_service(&mut self) -> Result<()> {
        panic!("service blew up");
    }
}

#[test]
fn test_service_loops_until_shutdown() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let shutdown = Arc::new(AtomicBool::new(false));

    let handle = spawn_service(TickingService { ticks: Arc::clone(&ticks), shutdown: Arc::clone(&shutdown) }).unwrap();

    thread::sleep(Duration::from_millis(100));
    shutdown.store(true, Ordering::SeqCst);
    handle.join().expect("service thread must exit cleanly");

    assert!(ticks.load(Ordering::SeqCst) > 0, "the service loop never ran");
}

#[test]
fn test_service_error_does_not_propagate() {
    let handle = spawn_service(FailingService).unwrap();

    // The error is logged at the service boundary; joining must succeed.
    handle.join().expect("a failing service must end its own thread gracefully");
}

#[test]
fn test_service_panic_is_contained() {
    let handle = spawn_service(PanickingService).unwrap();

    // The panic is caught inside the service thread, so join sees a normal exit.
    handle.join().expect("a panicking service must not poison its thread's exit");
}

#[test]
fn test_sigterm_requests_orderly_shutdown() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let watchdog = SignalWatchdog::install(Arc::clone(&shutdown)).expect("watchdog must install its handlers");

    unsafe {
        libc::raise(libc::SIGTERM);
    }

    // The handler only pokes the self-pipe; the watchdog thread does the rest.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !shutdown.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "the watchdog never reacted to SIGTERM");
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(watchdog.last_signal(), libc::SIGTERM);
}
