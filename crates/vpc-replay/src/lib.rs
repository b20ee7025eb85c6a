//! Crash-isolated parallel replay.
//!
//! A master process partitions the recorded pipeline workload across child
//! worker processes, supervises their progress over line-oriented stdout
//! pipes, restarts crashed workers past their last reported index and
//! propagates faulty shader-module hashes so no worker trips over the same
//! module twice. Telemetry flows through a shared-memory control block.

pub mod control;
pub mod database;
pub mod error;
pub mod message;
pub mod supervisor;
pub mod worker;

pub use control::ControlBlock;
pub use database::{Database, DatabaseError, JsonDatabase, ResourceTag};
pub use error::SupervisorError;
pub use message::WorkerMessage;
pub use supervisor::{run_master, ReplayOptions, ReplaySummary};
pub use worker::{run_worker, WorkerOptions};
