//! Snapshot-isolated transactions.
//!
//! sitx transactions follow a write-in-place protocol:
//! - **Start**: the timestamp oracle hands out a unique start timestamp
//! - **Write**: data goes straight to storage at version = start timestamp
//! - **Commit**: pending writes are flushed, the oracle durably records the
//!   decision, then shadow cells are written next to the data
//! - **Abort**: the written versions are deleted (best effort); a missing
//!   commit record is already proof of abort once the low watermark passes
//! - **Read**: each stored version is resolved to committed, aborted or
//!   undetermined and filtered against the reader's snapshot

mod manager;
mod state;
mod table;

pub use manager::TransactionManager;
pub use state::{Transaction, TransactionStatus};
pub use table::TransactionalTable;
