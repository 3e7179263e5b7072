//! # sitx Core
//!
//! Client side of sitx snapshot-isolated transactions.
//!
//! This crate provides:
//! - The commit table interface and an in-process implementation
//! - The shadow cell protocol
//! - Commit timestamp resolution (cache, shadow cell, commit table, low watermark)
//! - A transaction manager generic over the storage backend's cell type
//! - Snapshot reads and writes over a versioned key-value table
//! - The compaction garbage collector and its commit table client pool
//!
//! The timestamp oracle itself lives in `sitx_tso`; this crate only talks to
//! it through the [`TsoClient`] trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod commit_table;
mod config;
mod error;
pub mod gc;
pub mod resolver;
pub mod shadow;
mod transaction;
mod tso_client;
mod types;

#[cfg(test)]
mod test_support;

pub use backend::{CellId, KvBackend, KvCellId, TransactionalBackend};
pub use commit_table::{CommitTable, InMemoryCommitTable, InMemoryCommitTableClient};
pub use config::{CompactorConfig, TransactionManagerConfig, DEFAULT_COMMIT_TABLE_NAME};
pub use error::{CoreError, CoreResult};
pub use gc::{CompactionStats, Compactor};
pub use resolver::{CommitCache, CommitTimestampResolver, Location, Resolution};
pub use transaction::{Transaction, TransactionManager, TransactionStatus, TransactionalTable};
pub use tso_client::TsoClient;
pub use types::{CommitOutcome, Timestamp};
