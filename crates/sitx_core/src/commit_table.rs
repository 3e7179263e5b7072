//! The commit table: the authoritative store of transaction outcomes.
//!
//! The commit table maps a transaction's start timestamp to its commit
//! timestamp and holds a single low watermark. Absence of an entry is
//! meaningful: a start timestamp below the low watermark with no entry (and
//! no shadow cell) belongs to an aborted transaction.
//!
//! ## Invariants
//!
//! - A stored commit timestamp is always greater than its start timestamp
//! - The low watermark never decreases
//! - An entry may only be removed once every shadow cell of its write set
//!   is known to be written

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A client of the commit table service.
///
/// Readers (the resolver and the garbage collector) only use
/// [`CommitTable::read_low_watermark`] and
/// [`CommitTable::get_commit_timestamp`]; the timestamp oracle is the single
/// writer of commitments and of the low watermark.
pub trait CommitTable: Send + Sync {
    /// Reads the current low watermark.
    ///
    /// The value may be stale (lower than the latest), never higher.
    ///
    /// # Errors
    ///
    /// Returns an I/O-kind error on transport failure.
    fn read_low_watermark(&self) -> CoreResult<Timestamp>;

    /// Looks up the commit timestamp recorded for `start_ts`.
    ///
    /// # Errors
    ///
    /// Returns an I/O-kind error on transport failure.
    fn get_commit_timestamp(&self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>>;

    /// Records that `start_ts` committed at `commit_ts`.
    ///
    /// # Errors
    ///
    /// Returns an error if `commit_ts <= start_ts` or on transport failure.
    fn put(&self, start_ts: Timestamp, commit_ts: Timestamp) -> CoreResult<()>;

    /// Removes the entry for `start_ts` once its shadow cells are in place.
    fn complete_transaction(&self, start_ts: Timestamp) -> CoreResult<()>;

    /// Raises the low watermark; lower values are ignored.
    fn update_low_watermark(&self, low_watermark: Timestamp) -> CoreResult<()>;

    /// Returns false once the client can no longer serve requests.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Releases the client's resources.
    fn close(&self) {}
}

#[derive(Debug, Default)]
struct TableState {
    entries: RwLock<BTreeMap<Timestamp, Timestamp>>,
    low_watermark: AtomicU64,
}

/// An in-process commit table service.
///
/// Cloning yields another handle to the same table. Hand out clients with
/// [`InMemoryCommitTable::client`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommitTable {
    state: Arc<TableState>,
}

impl InMemoryCommitTable {
    /// Creates an empty commit table with a low watermark of zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client.
    #[must_use]
    pub fn client(&self) -> InMemoryCommitTableClient {
        InMemoryCommitTableClient {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the recorded commit timestamp for `start_ts`.
    #[must_use]
    pub fn commit_timestamp(&self, start_ts: Timestamp) -> Option<Timestamp> {
        self.state.entries.read().get(&start_ts).copied()
    }

    /// Returns the current low watermark.
    #[must_use]
    pub fn low_watermark(&self) -> Timestamp {
        Timestamp::new(self.state.low_watermark.load(Ordering::SeqCst))
    }

    /// Returns the number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.entries.read().len()
    }

    /// Returns true if no entry is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A client of an [`InMemoryCommitTable`].
#[derive(Debug)]
pub struct InMemoryCommitTableClient {
    state: Arc<TableState>,
    closed: AtomicBool,
}

impl InMemoryCommitTableClient {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::io("commit table", "client is closed"));
        }
        Ok(())
    }
}

impl CommitTable for InMemoryCommitTableClient {
    fn read_low_watermark(&self) -> CoreResult<Timestamp> {
        self.ensure_open()?;
        Ok(Timestamp::new(self.state.low_watermark.load(Ordering::SeqCst)))
    }

    fn get_commit_timestamp(&self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
        self.ensure_open()?;
        Ok(self.state.entries.read().get(&start_ts).copied())
    }

    fn put(&self, start_ts: Timestamp, commit_ts: Timestamp) -> CoreResult<()> {
        self.ensure_open()?;
        if commit_ts <= start_ts {
            return Err(CoreError::invalid_argument(format!(
                "commit timestamp {commit_ts} does not exceed start timestamp {start_ts}"
            )));
        }
        self.state.entries.write().insert(start_ts, commit_ts);
        Ok(())
    }

    fn complete_transaction(&self, start_ts: Timestamp) -> CoreResult<()> {
        self.ensure_open()?;
        self.state.entries.write().remove(&start_ts);
        Ok(())
    }

    fn update_low_watermark(&self, low_watermark: Timestamp) -> CoreResult<()> {
        self.ensure_open()?;
        self.state
            .low_watermark
            .fetch_max(low_watermark.as_u64(), Ordering::SeqCst);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
