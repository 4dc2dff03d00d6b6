use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::scheduler::dispatch::Scheduler;
use crate::scheduler::persistence::TransferStore;
use crate::scheduler::url_copy::UrlCopyRunner;

pub mod config;
pub mod error;
pub mod flow;
pub mod loader;
pub mod logger;
pub mod scheduler;
pub mod service;
pub mod sync;

/// Builds a ready-to-run scheduler from a configuration file and the two
/// external collaborators (persistence and the url-copy boundary).
pub fn build_scheduler(
    config_path: &str,
    store: Arc<dyn TransferStore>,
    runner: Arc<dyn UrlCopyRunner>,
    shutdown: Arc<AtomicBool>,
) -> Result<Scheduler> {
    logger::init();
    log::info!("Logger initialized. Loading scheduler configuration.");

    let config = SchedulerConfig::from_file(config_path)?;
    log::info!("Configuration loaded and validated from '{}'.", config_path);

    let scheduler = Scheduler::new(config, store, runner, shutdown)?;
    log::info!("Scheduler constructed successfully.");

    Ok(scheduler)
}
