use thiserror::Error;

use crate::control::ControlBlockError;
use crate::database::DatabaseError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker process: {0}")]
    WorkerSpawnFailed(#[source] std::io::Error),

    #[error("worker {index} timed out after crash; terminating")]
    WorkerTimedOut { index: usize },

    #[error("worker {index} died without reporting progress")]
    WorkerDirtyDeath { index: usize },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    ControlBlock(#[from] ControlBlockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
