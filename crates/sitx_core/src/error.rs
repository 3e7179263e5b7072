//! Error types for sitx core.

use crate::types::Timestamp;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in sitx core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] sitx_storage::StorageError),

    /// I/O-kind failure talking to the commit table or the timestamp oracle.
    ///
    /// Interruptions are reported with [`io::ErrorKind::Interrupted`].
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A transaction handle that this manager cannot accept.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Why the argument was rejected.
        message: String,
    },

    /// Operation not permitted in the transaction's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Flushing the transaction's pending writes failed.
    #[error("transaction {start_ts} failed while flushing writes: {source}")]
    TransactionFlush {
        /// Start timestamp of the failed transaction.
        start_ts: Timestamp,
        /// The storage failure.
        #[source]
        source: sitx_storage::StorageError,
    },

    /// The timestamp oracle decided to abort the transaction.
    #[error("transaction {start_ts} aborted: {reason}")]
    TransactionAborted {
        /// Start timestamp of the aborted transaction.
        start_ts: Timestamp,
        /// Reason for abort.
        reason: String,
    },

    /// A stored shadow cell or commit table value could not be decoded.
    #[error("corrupted commit timestamp: {message}")]
    CorruptedCommitTimestamp {
        /// Description of the corruption.
        message: String,
    },

    /// No pooled commit table client became available in time.
    #[error("commit table client pool exhausted after {waited_ms} ms")]
    PoolExhausted {
        /// How long the caller waited.
        waited_ms: u128,
    },

    /// An internal invariant was violated. This is a bug, never a
    /// recoverable condition.
    #[error("internal defect: {message}")]
    InternalDefect {
        /// What went wrong.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(start_ts: Timestamp, reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            start_ts,
            reason: reason.into(),
        }
    }

    /// Creates a corrupted commit timestamp error.
    pub fn corrupted_commit_timestamp(message: impl Into<String>) -> Self {
        Self::CorruptedCommitTimestamp {
            message: message.into(),
        }
    }

    /// Creates an internal defect error.
    pub fn internal_defect(message: impl Into<String>) -> Self {
        Self::InternalDefect {
            message: message.into(),
        }
    }

    /// Creates an I/O-kind error for a failed remote call.
    pub fn io(context: &str, cause: impl std::fmt::Display) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("{context}: {cause}"),
        ))
    }

    /// Creates an I/O-kind error recording that the caller was interrupted.
    pub fn interrupted(context: &str) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::Interrupted, context.to_string()))
    }

    /// Returns true if this error records an interruption of the caller.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::Interrupted)
    }
}
