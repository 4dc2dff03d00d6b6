use thiserror::Error;

use crate::scheduler::ids::FileId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Flow edge capacity must be positive, got {capacity} for link {from} -> {to}")]
    InvalidCapacity { from: usize, to: usize, capacity: i64 },

    #[error("Flow graph node index {0} is out of bounds")]
    UnknownNode(usize),

    #[error("Queue is closed, item rejected")]
    QueueClosed,

    #[error("Worker pool was interrupted before the task could be accepted")]
    PoolInterrupted,

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawnError(String),

    #[error("Persistence operation failed: {0}")]
    PersistenceError(String),

    #[error("Transfer {0} is not known to the store")]
    UnknownTransfer(FileId),

    #[error("Invalid scheduler configuration: {0}")]
    ConfigError(String),

    #[error("Failed to install signal handler for signal {0}")]
    SignalSetupError(i32),
}

pub type Result<T> = std::result::Result<T, Error>;
