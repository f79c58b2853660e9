use thiserror::Error;

/// Error taxonomy for the dataplane core (spec.md §7).
///
/// Per-packet failures never abort the pipeline — a handler that would
/// return one of these for a single packet instead drops the packet and
/// continues. Control-plane operations (rule updates, map creation) return
/// these to the caller so failed allocations can be rolled back.
#[derive(Error, Debug)]
pub enum FwdpError {
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient contention: {0}")]
    TransientContention(String),

    #[error("wire format error: {0}")]
    WireFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FwdpError>;
