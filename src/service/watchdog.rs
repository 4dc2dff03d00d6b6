use std::backtrace::Backtrace;
use std::io;
use std::mem;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// Signals that request an orderly shutdown.
const SHUTDOWN_SIGNALS: [i32; 2] = [libc::SIGINT, libc::SIGTERM];

/// Signals that are fatal: logged with a backtrace, then the process exits.
const FATAL_SIGNALS: [i32; 4] = [libc::SIGSEGV, libc::SIGABRT, libc::SIGBUS, libc::SIGFPE];

/// Best-effort window for services to wind down after a fatal signal.
const FATAL_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Write end of the self-pipe, published for the signal handler.
static SIGNAL_PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);

/// The signal handler itself does only async-signal-safe work: store the
/// signal number and poke the pipe so the watchdog thread wakes up. For
/// fatal signals it then parks the faulting thread forever, because
/// returning from a SIGSEGV handler would re-execute the faulting
/// instruction.
extern "C" fn handle_signal(signal: libc::c_int) {
    let fd = SIGNAL_PIPE_WRITE.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = [signal as u8];
        unsafe {
            libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }

    if FATAL_SIGNALS.contains(&signal) {
        loop {
            unsafe {
                libc::pause();
            }
        }
    }
}

/// Process supervision for asynchronous signals.
///
/// The handler/watchdog split exists because logging and stack unwinding are
/// not safe inside a signal handler: the handler only records the signal and
/// releases the watchdog thread, which then does the unsafe work (backtrace
/// capture, logging, orderly shutdown) in normal thread context.
pub struct SignalWatchdog {
    handle: Option<JoinHandle<()>>,
    last_signal: Arc<AtomicI32>,
}

impl SignalWatchdog {
    /// Installs the handlers and starts the watchdog thread.
    ///
    /// `shutdown` is the flag every service loop polls; SIGINT/SIGTERM set
    /// it, fatal signals set it and then exit the process after a grace
    /// period.
    pub fn install(shutdown: Arc<AtomicBool>) -> Result<Self> {
        let mut pipe_fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(pipe_fds.as_mut_ptr()) } != 0 {
            return Err(Error::IoError(io::Error::last_os_error()));
        }
        let (read_fd, write_fd) = (pipe_fds[0], pipe_fds[1]);
        SIGNAL_PIPE_WRITE.store(write_fd, Ordering::SeqCst);

        for &signal in SHUTDOWN_SIGNALS.iter().chain(FATAL_SIGNALS.iter()) {
            Self::install_handler(signal)?;
        }

        let last_signal = Arc::new(AtomicI32::new(0));
        let thread_last_signal = Arc::clone(&last_signal);

        let handle = thread::Builder::new()
            .name("signal-watchdog".to_string())
            .spawn(move || Self::watch_loop(read_fd, shutdown, thread_last_signal))
            .map_err(|e| Error::WorkerSpawnError(e.to_string()))?;

        Ok(SignalWatchdog { handle: Some(handle), last_signal })
    }

    fn install_handler(signal: i32) -> Result<()> {
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = handle_signal as usize;
            libc::sigemptyset(&mut action.sa_mask);

            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(Error::SignalSetupError(signal));
            }
        }
        Ok(())
    }

    /// Blocks on the self-pipe until the handler reports a signal, then does
    /// the work the handler must not: logging, backtraces, shutdown.
    fn watch_loop(read_fd: libc::c_int, shutdown: Arc<AtomicBool>, last_signal: Arc<AtomicI32>) {
        loop {
            let mut buffer = [0u8; 1];
            let read = unsafe { libc::read(read_fd, buffer.as_mut_ptr() as *mut libc::c_void, 1) };

            if read < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("Signal watchdog pipe read failed: {}", err);
                return;
            }
            if read == 0 {
                // Write end closed; nothing left to watch.
                return;
            }

            let signal = buffer[0] as i32;
            last_signal.store(signal, Ordering::SeqCst);

            if FATAL_SIGNALS.contains(&signal) {
                log::error!("Fatal signal {} received, capturing stack trace before exit", signal);
                log::error!("{}", Backtrace::force_capture());

                shutdown.store(true, Ordering::SeqCst);
                thread::sleep(FATAL_SHUTDOWN_GRACE);

                process::exit(128 + signal);
            }

            log::info!("Signal {} received, requesting orderly shutdown", signal);
            shutdown.store(true, Ordering::SeqCst);
        }
    }

    /// The last signal observed by the watchdog, 0 if none.
    pub fn last_signal(&self) -> i32 {
        self.last_signal.load(Ordering::SeqCst)
    }
}

impl Drop for SignalWatchdog {
    fn drop(&mut self) {
        // Closing the write end unblocks the watchdog read loop.
        let fd = SIGNAL_PIPE_WRITE.swap(-1, Ordering::SeqCst);
        if fd >= 0 {
            unsafe {
                libc::close(fd);
            }
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
