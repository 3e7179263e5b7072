//! Fault-injecting wrappers.
//!
//! Each wrapper forwards to an inner collaborator and fails on demand. The
//! switches live behind an `Arc`, so a test keeps its handle after the
//! wrapper has been moved into the component under test.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (log, faults) = FailingLog::new(InMemoryLog::new());
//! let server = TsoServer::open(Box::new(log), ...)?;
//! faults.fail_appends(true);
//! ```

use sitx_core::{CommitTable, CoreError, CoreResult, Timestamp};
use sitx_storage::{
    CellKey, CompactionKind, FamilyDescriptor, LogBackend, StorageError, StorageResult,
    StoredCell, VersionedStore,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

fn injected(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("injected failure: {what}"),
    ))
}

/// Switches for a [`FailingLog`].
#[derive(Debug)]
pub struct LogFaults {
    fail_appends: AtomicBool,
    fail_sync: AtomicBool,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    failures: AtomicU64,
}

impl LogFaults {
    /// Makes every append fail without writing anything.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Makes flush and sync fail after the bytes were appended.
    pub fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Writes at most `bytes` more bytes; the append crossing the limit is
    /// torn at the limit and fails.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Clears every switch.
    pub fn reset(&self) {
        self.fail_appends.store(false, Ordering::SeqCst);
        self.fail_sync.store(false, Ordering::SeqCst);
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
    }

    /// Returns how many operations were failed.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    fn fail(&self, what: &str) -> StorageError {
        self.failures.fetch_add(1, Ordering::SeqCst);
        injected(what)
    }
}

impl Default for LogFaults {
    fn default() -> Self {
        Self {
            fail_appends: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// A log backend that can fail appends, tear writes and fail syncs.
pub struct FailingLog<L> {
    inner: L,
    faults: Arc<LogFaults>,
}

impl<L: LogBackend> FailingLog<L> {
    /// Wraps `inner`, returning the wrapper and its switches.
    pub fn new(inner: L) -> (Self, Arc<LogFaults>) {
        let faults = Arc::new(LogFaults::default());
        (
            Self {
                inner,
                faults: Arc::clone(&faults),
            },
            faults,
        )
    }
}

impl<L: LogBackend> LogBackend for FailingLog<L> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults.fail_appends.load(Ordering::SeqCst) {
            return Err(self.faults.fail("append"));
        }

        let written = self.faults.bytes_written.load(Ordering::SeqCst);
        let limit = self.faults.crash_after_bytes.load(Ordering::SeqCst);
        if written.saturating_add(data.len()) > limit {
            let partial = limit.saturating_sub(written);
            if partial > 0 {
                self.inner.append(&data[..partial])?;
                self.faults.bytes_written.fetch_add(partial, Ordering::SeqCst);
            }
            return Err(self.faults.fail("torn append"));
        }

        let offset = self.inner.append(data)?;
        self.faults.bytes_written.fetch_add(data.len(), Ordering::SeqCst);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.faults.fail_sync.load(Ordering::SeqCst) {
            return Err(self.faults.fail("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.faults.fail_sync.load(Ordering::SeqCst) {
            return Err(self.faults.fail("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Switches for a [`FlakyStore`].
#[derive(Debug, Default)]
pub struct StoreFaults {
    fail_flush: AtomicBool,
    fail_shadow_writes: AtomicBool,
    fail_deletes: AtomicBool,
    fail_compaction: AtomicBool,
    failures: AtomicU64,
}

impl StoreFaults {
    /// Makes `flush` fail.
    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Makes puts to shadow cell qualifiers fail.
    pub fn fail_shadow_writes(&self, fail: bool) {
        self.fail_shadow_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `delete_version` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Makes `finish_compaction` fail.
    pub fn fail_compaction(&self, fail: bool) {
        self.fail_compaction.store(fail, Ordering::SeqCst);
    }

    /// Returns how many operations were failed.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    fn check(&self, switch: &AtomicBool, what: &str) -> StorageResult<()> {
        if switch.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(injected(what));
        }
        Ok(())
    }
}

/// A versioned store that fails selected operations.
pub struct FlakyStore {
    inner: Arc<dyn VersionedStore>,
    faults: Arc<StoreFaults>,
}

impl FlakyStore {
    /// Wraps `inner`, returning the wrapper and its switches.
    pub fn new(inner: Arc<dyn VersionedStore>) -> (Self, Arc<StoreFaults>) {
        let faults = Arc::new(StoreFaults::default());
        (
            Self {
                inner,
                faults: Arc::clone(&faults),
            },
            faults,
        )
    }
}

impl VersionedStore for FlakyStore {
    fn family_descriptor(&self, table: &str, family: &[u8]) -> StorageResult<FamilyDescriptor> {
        self.inner.family_descriptor(table, family)
    }

    fn get(&self, table: &str, key: &CellKey, version: u64) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(table, key, version)
    }

    fn versions(
        &self,
        table: &str,
        key: &CellKey,
        max_version: u64,
    ) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        self.inner.versions(table, key, max_version)
    }

    fn put(&self, table: &str, key: CellKey, version: u64, value: Vec<u8>) -> StorageResult<()> {
        if sitx_core::shadow::is_shadow_cell(&key.qualifier) {
            self.faults
                .check(&self.faults.fail_shadow_writes, "shadow cell write")?;
        }
        self.inner.put(table, key, version, value)
    }

    fn delete_version(&self, table: &str, key: &CellKey, version: u64) -> StorageResult<()> {
        self.faults.check(&self.faults.fail_deletes, "delete")?;
        self.inner.delete_version(table, key, version)
    }

    fn flush(&self, table: &str) -> StorageResult<()> {
        self.faults.check(&self.faults.fail_flush, "flush")?;
        self.inner.flush(table)
    }

    fn compaction_input(&self, table: &str, family: &[u8]) -> StorageResult<Vec<StoredCell>> {
        self.inner.compaction_input(table, family)
    }

    fn finish_compaction(
        &self,
        table: &str,
        family: &[u8],
        kind: CompactionKind,
        input: &[StoredCell],
        retained: &[StoredCell],
    ) -> StorageResult<()> {
        self.faults
            .check(&self.faults.fail_compaction, "compaction merge")?;
        self.inner
            .finish_compaction(table, family, kind, input, retained)
    }
}

/// Switches for a [`FlakyCommitTable`].
#[derive(Debug, Default)]
pub struct CommitTableFaults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    interrupt_reads: AtomicBool,
    unhealthy: AtomicBool,
}

impl CommitTableFaults {
    /// Makes lookups and low watermark reads fail with an I/O-kind error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes reads fail as if the caller was interrupted.
    pub fn interrupt_reads(&self, interrupt: bool) {
        self.interrupt_reads.store(interrupt, Ordering::SeqCst);
    }

    /// Makes puts, completions and watermark updates fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes health checks fail.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    fn check_read(&self) -> CoreResult<()> {
        if self.interrupt_reads.load(Ordering::SeqCst) {
            return Err(CoreError::interrupted("commit table read"));
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::io("commit table", "injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self) -> CoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::io("commit table", "injected write failure"));
        }
        Ok(())
    }
}

/// A commit table client that fails on demand.
pub struct FlakyCommitTable {
    inner: Box<dyn CommitTable>,
    faults: Arc<CommitTableFaults>,
}

impl FlakyCommitTable {
    /// Wraps `inner` with a fresh set of switches.
    pub fn new(inner: Box<dyn CommitTable>) -> (Self, Arc<CommitTableFaults>) {
        let faults = Arc::new(CommitTableFaults::default());
        (Self::with_faults(inner, Arc::clone(&faults)), faults)
    }

    /// Wraps `inner` with switches shared with other wrappers.
    pub fn with_faults(inner: Box<dyn CommitTable>, faults: Arc<CommitTableFaults>) -> Self {
        Self { inner, faults }
    }
}

impl CommitTable for FlakyCommitTable {
    fn read_low_watermark(&self) -> CoreResult<Timestamp> {
        self.faults.check_read()?;
        self.inner.read_low_watermark()
    }

    fn get_commit_timestamp(&self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
        self.faults.check_read()?;
        self.inner.get_commit_timestamp(start_ts)
    }

    fn put(&self, start_ts: Timestamp, commit_ts: Timestamp) -> CoreResult<()> {
        self.faults.check_write()?;
        self.inner.put(start_ts, commit_ts)
    }

    fn complete_transaction(&self, start_ts: Timestamp) -> CoreResult<()> {
        self.faults.check_write()?;
        self.inner.complete_transaction(start_ts)
    }

    fn update_low_watermark(&self, low_watermark: Timestamp) -> CoreResult<()> {
        self.faults.check_write()?;
        self.inner.update_low_watermark(low_watermark)
    }

    fn is_healthy(&self) -> bool {
        !self.faults.unhealthy.load(Ordering::SeqCst) && self.inner.is_healthy()
    }

    fn close(&self) {
        self.inner.close();
    }
}
