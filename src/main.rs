mod config;
mod error;
mod flow;
mod loader;
mod logger;
mod scheduler;
mod service;
mod sync;

use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::SchedulerConfig;
use crate::scheduler::dispatch::Scheduler;
use crate::scheduler::ids::{ActivityId, FileId, JobId, SeId, VoId};
use crate::scheduler::persistence::{InMemoryTransferStore, ShareConfig, TransferStore};
use crate::scheduler::transfer::{TransferRequest, TransferState};
use crate::scheduler::url_copy::{MockUrlCopy, ProcessUrlCopy, UrlCopyRunner};
use crate::service::base_service::spawn_service;
use crate::service::watchdog::SignalWatchdog;

#[derive(Debug, Parser)]
#[command(name = "fts-scheduler", about = "Grid file-transfer scheduling service")]
struct Args {
    /// Path of the scheduler configuration JSON. Defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Run against an in-memory store with synthetic transfers and a mock
    /// url-copy instead of the real collaborators.
    #[arg(long)]
    demo: bool,

    /// Number of synthetic transfers seeded in demo mode.
    #[arg(long, default_value_t = 40)]
    demo_transfers: usize,
}

fn main() {
    logger::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match SchedulerConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Could not load configuration from '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            log::info!("No configuration file given, using defaults.");
            SchedulerConfig::default()
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));

    let _watchdog = match SignalWatchdog::install(Arc::clone(&shutdown)) {
        Ok(watchdog) => watchdog,
        Err(e) => {
            log::error!("Could not install signal watchdog: {}", e);
            std::process::exit(1);
        }
    };

    let (store, runner): (Arc<dyn TransferStore>, Arc<dyn UrlCopyRunner>) = if args.demo {
        log::info!("Demo mode: seeding {} synthetic transfer(s).", args.demo_transfers);
        (Arc::new(seed_demo_store(args.demo_transfers)), Arc::new(MockUrlCopy { delay: Duration::from_millis(250), failure_rate: 0.1, fail_marker: None }))
    } else {
        (Arc::new(InMemoryTransferStore::new()), Arc::new(ProcessUrlCopy::new(config.url_copy_binary.clone())))
    };

    let scheduler = match Scheduler::new(config, store, runner, Arc::clone(&shutdown)) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            log::error!("Could not construct the scheduler: {}", e);
            std::process::exit(1);
        }
    };

    match spawn_service(scheduler) {
        Ok(handle) => {
            if handle.join().is_err() {
                log::error!("Scheduler service thread could not be joined.");
            }
        }
        Err(e) => {
            log::error!("Could not start the scheduler service: {}", e);
            std::process::exit(1);
        }
    }

    log::info!("fts-scheduler shut down.");
}

/// Builds an in-memory store with transfers spread over two VOs and three
/// storage pairs, so the fair-share and flow paths are all exercised.
fn seed_demo_store(count: usize) -> InMemoryTransferStore {
    let store = InMemoryTransferStore::new();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_millis() as i64;

    let pairs = [("se-alpha", "se-delta"), ("se-beta", "se-delta"), ("se-gamma", "se-epsilon")];
    let vos = ["atlas", "cms"];

    for index in 0..count {
        let (source_se, dest_se) = pairs[index % pairs.len()];
        let vo = vos[index % vos.len()];
        let job_id = JobId::generate();

        store.insert(TransferRequest {
            job_id: job_id.clone(),
            file_id: FileId::new(format!("{}-file-{}", job_id, index)),
            source_url: format!("gsiftp://{}.example.org/data/file-{}", source_se, index),
            dest_url: format!("gsiftp://{}.example.org/data/file-{}", dest_se, index),
            source_se: SeId::new(source_se),
            dest_se: SeId::new(dest_se),
            vo: VoId::new(vo),
            user_dn: format!("/DC=org/DC=example/CN=demo-user-{}", vo),
            activity: ActivityId::new("default"),
            priority: (index % 5) as i32,
            checksum: Some(format!("adler32:{:08x}", index)),
            source_space_token: None,
            dest_space_token: None,
            state: TransferState::Submitted,
            submitted_at: now + index as i64,
        });
    }

    store.set_shares(vec![ShareConfig::wildcard(VoId::new("atlas"), 30), ShareConfig::wildcard(VoId::new("cms"), 20)]);

    store
}
