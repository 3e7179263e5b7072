//! Error types for the timestamp oracle.

use sitx_core::CoreError;
use sitx_storage::StorageError;
use thiserror::Error;

/// Result type for timestamp oracle operations.
pub type TsoResult<T> = Result<T, TsoError>;

/// Errors that can occur in the timestamp oracle.
#[derive(Debug, Error)]
pub enum TsoError {
    /// Log backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Commit table error.
    #[error("commit table error: {0}")]
    Core(#[from] CoreError),

    /// A batch could not be made durable. None of its replies were sent.
    #[error("durability fault on batch {batch}: {message}")]
    Durability {
        /// Sequence number of the failed batch.
        batch: u64,
        /// What failed.
        message: String,
    },

    /// The pipeline queue is full and the reject policy is configured.
    #[error("pipeline queue full ({capacity} pending events)")]
    Backpressure {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The pipeline has been shut down.
    #[error("timestamp oracle is shut down")]
    Shutdown,

    /// No reply arrived in time. The outcome is unknown.
    #[error("no reply after {waited_ms} ms")]
    Timeout {
        /// How long the caller waited.
        waited_ms: u128,
    },

    /// The write-ahead log is malformed.
    #[error("WAL corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the offending batch.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A batch checksum did not match its content.
    #[error("WAL checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Offset of the offending batch.
        offset: u64,
        /// Checksum stored in the batch.
        expected: u32,
        /// Checksum computed over the batch.
        actual: u32,
    },
}

impl TsoError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if the log itself is damaged, as opposed to unavailable.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::ChecksumMismatch { .. })
    }
}

impl From<TsoError> for CoreError {
    /// Every oracle failure reaches transaction callers as an I/O-kind
    /// error: the decision may or may not have been recorded.
    fn from(err: TsoError) -> Self {
        match err {
            TsoError::Core(inner) => inner,
            other => CoreError::io("timestamp oracle", other),
        }
    }
}
