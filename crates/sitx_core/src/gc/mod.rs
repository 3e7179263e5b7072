//! Compaction-time garbage collection.
//!
//! When the store compacts a transaction-managed column family, every stored
//! version is run through a [`CompactorScanner`] that drops versions no
//! reader can ever observe again:
//!
//! - versions written by aborted transactions
//! - committed versions superseded below the low watermark
//! - shadow cells whose data version is gone
//! - delete markers, on major compactions, unless configured to keep them
//!
//! Undetermined versions are always kept. The low watermark is read from a
//! pooled commit table client; a stale value only delays pruning.

mod compactor;
mod pool;
mod scanner;

pub use compactor::Compactor;
pub use pool::{CommitTableClientPool, CommitTableFactory, PooledClient};
pub use scanner::{CompactionStats, CompactorScanner};
