//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a log.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The stored data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,

    /// The addressed table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The addressed column family does not exist in the table.
    #[error("column family {family} not found in table {table}")]
    FamilyNotFound {
        /// Table name.
        table: String,
        /// Family name (lossy UTF-8).
        family: String,
    },
}

impl StorageError {
    /// Creates a family-not-found error.
    pub fn family_not_found(table: &str, family: &[u8]) -> Self {
        Self::FamilyNotFound {
            table: table.to_string(),
            family: String::from_utf8_lossy(family).into_owned(),
        }
    }
}
