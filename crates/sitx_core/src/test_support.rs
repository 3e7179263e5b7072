//! Doubles shared by unit tests.

use crate::commit_table::{CommitTable, InMemoryCommitTable, InMemoryCommitTableClient};
use crate::error::{CoreError, CoreResult};
use crate::tso_client::TsoClient;
use crate::types::{CommitOutcome, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Oracle double: hands out consecutive timestamps and records commits in
/// the commit table the way the real oracle does.
pub(crate) struct FakeTso {
    pub(crate) next: AtomicU64,
    pub(crate) commit_table: InMemoryCommitTableClient,
    pub(crate) abort_next: AtomicBool,
    pub(crate) unreachable: AtomicBool,
    pub(crate) aborted: Mutex<Vec<Timestamp>>,
}

impl FakeTso {
    pub(crate) fn new(table: &InMemoryCommitTable, first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
            commit_table: table.client(),
            abort_next: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            aborted: Mutex::new(Vec::new()),
        }
    }
}

impl TsoClient for FakeTso {
    fn start_timestamp(&self) -> CoreResult<Timestamp> {
        Ok(Timestamp::new(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn commit(&self, start_ts: Timestamp) -> CoreResult<CommitOutcome> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CoreError::io("tso", "connection reset"));
        }
        if self.abort_next.swap(false, Ordering::SeqCst) {
            return Ok(CommitOutcome::Aborted);
        }
        let commit_ts = Timestamp::new(self.next.fetch_add(1, Ordering::SeqCst));
        self.commit_table.put(start_ts, commit_ts)?;
        Ok(CommitOutcome::Committed(commit_ts))
    }

    fn abort(&self, start_ts: Timestamp) -> CoreResult<()> {
        self.aborted.lock().push(start_ts);
        Ok(())
    }
}
