use thiserror::Error;

/// Errors surfaced by [`crate::StateRecorder`] registration and lookup.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("handle is not registered: {kind} {handle:#x}")]
    UnknownHandle { kind: &'static str, handle: u64 },

    #[error("arena allocation failed")]
    AllocationFailed,

    #[error("document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by [`crate::StateReplayer::parse`].
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("document parsing failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("blob decoding failed: {0}")]
    Blob(#[from] base64::DecodeError),

    #[error("blob length {actual} does not match declared size {declared}")]
    BlobSize { declared: u64, actual: usize },

    #[error("{section} reference {stored} out of range (section has {len} entries)")]
    IndexOutOfRange {
        section: &'static str,
        stored: u32,
        len: usize,
    },

    #[error("arena allocation failed")]
    AllocationFailed,

    #[error("creator failed: {0}")]
    Creation(String),
}
