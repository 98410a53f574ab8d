use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Scan cancelled")]
    Cancelled,

    #[error("No library source registered for partition {partition}")]
    LibraryNotConfigured { partition: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

impl SyncError {
    /// Cancellation is the only outcome `synchronize` propagates.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
