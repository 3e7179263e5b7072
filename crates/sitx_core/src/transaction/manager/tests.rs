use super::*;
use crate::backend::{KvBackend, KvCellId};
use crate::commit_table::InMemoryCommitTable;
use crate::shadow::read_shadow_cell;
use crate::transaction::TransactionStatus;
use crate::test_support::FakeTso;
use sitx_storage::{CellKey, FamilyDescriptor, InMemoryStore, StorageError, StorageResult, VersionedStore};
use std::sync::atomic::AtomicBool;

/// Backend double that can fail flushes or shadow cell writes on demand.
struct FlakyBackend {
    inner: KvBackend,
    fail_flush: AtomicBool,
    fail_shadow_writes: AtomicBool,
}

impl TransactionalBackend for FlakyBackend {
    type Cell = KvCellId;

    fn read(&self, cell: &KvCellId, version: Timestamp) -> StorageResult<Option<Vec<u8>>> {
        self.inner.read(cell, version)
    }

    fn write(&self, cell: &KvCellId, version: Timestamp, value: Vec<u8>) -> StorageResult<()> {
        if self.fail_shadow_writes.load(Ordering::SeqCst)
            && shadow::is_shadow_cell(&cell.key.qualifier)
        {
            return Err(StorageError::Corrupted("injected shadow write failure".into()));
        }
        self.inner.write(cell, version, value)
    }

    fn delete_version(&self, cell: &KvCellId, version: Timestamp) -> StorageResult<()> {
        self.inner.delete_version(cell, version)
    }

    fn flush(&self, target: &String) -> StorageResult<()> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(StorageError::Corrupted("injected flush failure".into()));
        }
        self.inner.flush(target)
    }

    fn shadow_cell(&self, cell: &KvCellId) -> KvCellId {
        self.inner.shadow_cell(cell)
    }
}

struct Fixture {
    store: Arc<InMemoryStore>,
    table: InMemoryCommitTable,
    tso: Arc<FakeTso>,
    backend: Arc<FlakyBackend>,
    manager: TransactionManager<FlakyBackend>,
}

fn fixture_with(config: TransactionManagerConfig, first_ts: u64) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    store.create_table("t", vec![FamilyDescriptor::transactional("cf")]);
    let table = InMemoryCommitTable::new();
    let tso = Arc::new(FakeTso::new(&table, first_ts));
    let backend = Arc::new(FlakyBackend {
        inner: KvBackend::new(store.clone()),
        fail_flush: AtomicBool::new(false),
        fail_shadow_writes: AtomicBool::new(false),
    });
    let manager = TransactionManager::new(
        backend.clone(),
        tso.clone(),
        Arc::new(table.client()),
        config,
    );
    Fixture {
        store,
        table,
        tso,
        backend,
        manager,
    }
}

fn fixture() -> Fixture {
    fixture_with(TransactionManagerConfig::default(), 100)
}

fn cell(q: &str) -> KvCellId {
    KvCellId::new("t", CellKey::new("row1", "cf", q))
}

#[test]
fn commit_records_decision_and_shadow_cells() {
    let f = fixture();
    let mut tx = f.manager.begin().unwrap();
    assert_eq!(tx.start_timestamp(), Timestamp::new(100));

    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();
    let commit_ts = f.manager.commit(&mut tx).unwrap();

    assert_eq!(commit_ts, Timestamp::new(101));
    assert_eq!(tx.status(), TransactionStatus::Committed);
    assert_eq!(f.table.commit_timestamp(Timestamp::new(100)), Some(commit_ts));
    assert_eq!(
        read_shadow_cell(f.backend.as_ref(), &cell("q"), Timestamp::new(100)).unwrap(),
        Some(commit_ts)
    );
    assert!(f.manager.is_committed(&cell("q"), Timestamp::new(100)).unwrap());
}

#[test]
fn complete_after_shadow_cells_removes_entry() {
    let config = TransactionManagerConfig::new().complete_after_shadow_cells(true);
    let f = fixture_with(config, 100);
    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();
    f.manager.commit(&mut tx).unwrap();

    assert!(f.table.is_empty());
    // Still committed through the shadow cell.
    assert!(f.manager.is_committed(&cell("q"), Timestamp::new(100)).unwrap());
}

#[test]
fn failed_shadow_cells_keep_entry_and_commit() {
    let config = TransactionManagerConfig::new().complete_after_shadow_cells(true);
    let f = fixture_with(config, 100);
    f.backend.fail_shadow_writes.store(true, Ordering::SeqCst);

    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();
    assert!(f.manager.commit(&mut tx).is_ok());

    assert_eq!(f.table.len(), 1);
    assert!(f.manager.is_committed(&cell("q"), Timestamp::new(100)).unwrap());
}

#[test]
fn oracle_abort_cleans_up_writes() {
    let f = fixture();
    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();
    f.tso.abort_next.store(true, Ordering::SeqCst);

    let result = f.manager.commit(&mut tx);
    assert!(matches!(result, Err(CoreError::TransactionAborted { .. })));
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    assert_eq!(f.store.get("t", &cell("q").key, 100).unwrap(), None);
}

#[test]
fn rollback_notifies_oracle_and_cleans_up() {
    let f = fixture();
    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();

    f.manager.rollback(&mut tx).unwrap();

    assert_eq!(*f.tso.aborted.lock(), vec![Timestamp::new(100)]);
    assert_eq!(f.store.get("t", &cell("q").key, 100).unwrap(), None);
    assert!(f.manager.commit(&mut tx).is_err());
}

#[test]
fn flush_failure_is_a_manager_error() {
    let f = fixture();
    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();
    f.backend.fail_flush.store(true, Ordering::SeqCst);

    let result = f.manager.commit(&mut tx);
    assert!(matches!(result, Err(CoreError::TransactionFlush { .. })));
    assert_eq!(tx.status(), TransactionStatus::Aborted);
    // Cleanup ran before the error surfaced; no commit was requested.
    assert!(f.table.is_empty());
}

#[test]
fn foreign_handle_is_rejected_without_side_effects() {
    let f = fixture();
    let other = fixture();
    let mut tx = other.manager.begin().unwrap();

    let result = f.manager.write(&mut tx, cell("q"), b"v".to_vec());
    assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
    assert_eq!(tx.write_count(), 0);

    assert!(matches!(
        f.manager.commit(&mut tx),
        Err(CoreError::InvalidArgument { .. })
    ));
    assert!(tx.is_active());
}

#[test]
fn unknown_outcome_leaves_transaction_active() {
    let f = fixture();
    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();
    f.tso.unreachable.store(true, Ordering::SeqCst);

    assert!(matches!(f.manager.commit(&mut tx), Err(CoreError::Io(_))));
    assert!(tx.is_active());
    assert_eq!(f.store.get("t", &cell("q").key, 100).unwrap(), Some(b"v".to_vec()));
}

#[test]
fn uncommitted_version_is_not_committed() {
    let f = fixture();
    let mut tx = f.manager.begin().unwrap();
    f.manager.write(&mut tx, cell("q"), b"v".to_vec()).unwrap();

    assert!(!f.manager.is_committed(&cell("q"), Timestamp::new(100)).unwrap());
}

#[test]
fn backfill_writes_missing_shadow_cell() {
    let config = TransactionManagerConfig::new().backfill_shadow_cells(true);
    let f = fixture_with(config, 100);
    f.table.client().put(Timestamp::new(50), Timestamp::new(60)).unwrap();

    assert!(f.manager.is_committed(&cell("q"), Timestamp::new(50)).unwrap());
    assert_eq!(
        read_shadow_cell(f.backend.as_ref(), &cell("q"), Timestamp::new(50)).unwrap(),
        Some(Timestamp::new(60))
    );
}

#[test]
fn low_watermark_reads_through() {
    let f = fixture();
    f.table.client().update_low_watermark(Timestamp::new(42)).unwrap();
    assert_eq!(f.manager.low_watermark().unwrap(), Timestamp::new(42));
}
