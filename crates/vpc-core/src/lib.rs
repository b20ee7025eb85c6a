//! Capture and replay of Vulkan pipeline-creation state.
//!
//! A capturing host registers pipeline-creation descriptors with a
//! [`StateRecorder`], which fingerprints them, copies them by value and
//! rewrites handle references into stable indices. [`StateRecorder::serialize`]
//! snapshots the whole graph into a portable JSON document. A
//! [`StateReplayer`] parses such a document and drives a [`StateCreator`]
//! back-end in dependency order, so a driver can repopulate its internal
//! caches without the original application.

pub mod arena;
pub mod creator;
pub mod document;
pub mod error;
pub mod hasher;
pub mod hashing;
pub mod recorder;
pub mod replayer;
pub mod types;

pub use arena::{ByteRange, ScratchAllocator};
pub use creator::StateCreator;
pub use error::{RecordError, ReplayError};
pub use hasher::Hasher;
pub use recorder::StateRecorder;
pub use replayer::StateReplayer;
pub use types::{Handle, Hash, ResourceRef};
