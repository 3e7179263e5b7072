//! Snapshot-isolated access to one table of a [`VersionedStore`].

use crate::backend::{KvBackend, KvCellId};
use crate::error::{CoreError, CoreResult};
use crate::resolver::{CommitCache, Resolution};
use crate::shadow::is_shadow_cell;
use crate::transaction::manager::TransactionManager;
use crate::transaction::state::Transaction;
use crate::types::Timestamp;
use sitx_storage::CellKey;

/// A table read and written through transactions.
///
/// Every write lands at version = the transaction's start timestamp. A
/// delete is a transactional write of an empty value, so it commits or
/// aborts together with the rest of the transaction.
///
/// # Example
///
/// ```rust,ignore
/// let table = TransactionalTable::new(&manager, "users");
/// let mut tx = manager.begin()?;
/// table.put(&mut tx, "row1", "cf", "name", b"ada".to_vec())?;
/// manager.commit(&mut tx)?;
/// ```
pub struct TransactionalTable<'m> {
    manager: &'m TransactionManager<KvBackend>,
    name: String,
}

impl<'m> TransactionalTable<'m> {
    /// Binds a table to a manager.
    pub fn new(manager: &'m TransactionManager<KvBackend>, name: impl Into<String>) -> Self {
        Self {
            manager,
            name: name.into(),
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes a value.
    ///
    /// # Errors
    ///
    /// Empty values are reserved for delete markers and shadow cell
    /// qualifiers are reserved for the commit protocol; both are rejected
    /// with [`CoreError::InvalidArgument`].
    pub fn put(
        &self,
        tx: &mut Transaction<KvCellId>,
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: Vec<u8>,
    ) -> CoreResult<()> {
        if value.is_empty() {
            return Err(CoreError::invalid_argument(
                "empty values are reserved for delete markers",
            ));
        }
        let cell = self.cell(row, family, qualifier)?;
        self.manager.write(tx, cell, value)
    }

    /// Deletes a cell as of this transaction.
    pub fn delete(
        &self,
        tx: &mut Transaction<KvCellId>,
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> CoreResult<()> {
        let cell = self.cell(row, family, qualifier)?;
        self.manager.write(tx, cell, Vec::new())
    }

    /// Reads the value visible to `tx`.
    ///
    /// Versions are examined newest first. The first one that is either the
    /// transaction's own write or committed before the transaction started
    /// wins; a delete marker reads as absent.
    pub fn get(
        &self,
        tx: &Transaction<KvCellId>,
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> CoreResult<Option<Vec<u8>>> {
        self.manager.check_handle(tx)?;
        tx.ensure_active()?;

        let cell = self.cell(row, family, qualifier)?;
        let start_ts = tx.start_timestamp();
        let versions = self.manager.backend().store().versions(
            &self.name,
            &cell.key,
            start_ts.as_u64(),
        )?;

        let mut cache = CommitCache::new();
        for (version, value) in versions {
            let version = Timestamp::new(version);
            if version == start_ts {
                if tx.has_written(&cell) {
                    return Ok(non_empty(value));
                }
                continue;
            }
            match self.manager.resolve(&cell, version, &mut cache)? {
                Resolution::Committed { commit_ts, .. } if commit_ts < start_ts => {
                    return Ok(non_empty(value));
                }
                Resolution::Committed { .. } | Resolution::Aborted | Resolution::Undetermined => {}
            }
        }
        Ok(None)
    }

    fn cell(
        &self,
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> CoreResult<KvCellId> {
        let key = CellKey::new(row, family, qualifier);
        if is_shadow_cell(&key.qualifier) {
            return Err(CoreError::invalid_argument(format!(
                "qualifier of {key:?} is reserved for shadow cells"
            )));
        }
        Ok(KvCellId::new(self.name.clone(), key))
    }
}

fn non_empty(value: Vec<u8>) -> Option<Vec<u8>> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit_table::{CommitTable, InMemoryCommitTable};
    use crate::config::TransactionManagerConfig;
    use crate::test_support::FakeTso;
    use sitx_storage::{FamilyDescriptor, InMemoryStore, VersionedStore};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, InMemoryCommitTable, TransactionManager<KvBackend>) {
        let store = Arc::new(InMemoryStore::new());
        store.create_table("t", vec![FamilyDescriptor::transactional("cf")]);
        let table = InMemoryCommitTable::new();
        let manager = TransactionManager::new(
            Arc::new(KvBackend::new(store.clone())),
            Arc::new(FakeTso::new(&table, 1)),
            Arc::new(table.client()),
            TransactionManagerConfig::default(),
        );
        (store, table, manager)
    }

    #[test]
    fn reads_own_writes() {
        let (_, _, manager) = setup();
        let table = TransactionalTable::new(&manager, "t");
        let mut tx = manager.begin().unwrap();

        table.put(&mut tx, "r", "cf", "q", b"mine".to_vec()).unwrap();
        assert_eq!(table.get(&tx, "r", "cf", "q").unwrap(), Some(b"mine".to_vec()));
    }

    #[test]
    fn snapshot_excludes_later_and_uncommitted_writes() {
        let (_, _, manager) = setup();
        let table = TransactionalTable::new(&manager, "t");

        let mut writer = manager.begin().unwrap();
        table.put(&mut writer, "r", "cf", "q", b"v1".to_vec()).unwrap();
        manager.commit(&mut writer).unwrap();

        let reader = manager.begin().unwrap();

        let mut later = manager.begin().unwrap();
        table.put(&mut later, "r", "cf", "q", b"v2".to_vec()).unwrap();
        manager.commit(&mut later).unwrap();

        let mut pending = manager.begin().unwrap();
        table.put(&mut pending, "r", "cf", "q", b"v3".to_vec()).unwrap();

        assert_eq!(table.get(&reader, "r", "cf", "q").unwrap(), Some(b"v1".to_vec()));

        let fresh = manager.begin().unwrap();
        assert_eq!(table.get(&fresh, "r", "cf", "q").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn committed_delete_hides_older_value() {
        let (_, _, manager) = setup();
        let table = TransactionalTable::new(&manager, "t");

        let mut tx = manager.begin().unwrap();
        table.put(&mut tx, "r", "cf", "q", b"v".to_vec()).unwrap();
        manager.commit(&mut tx).unwrap();

        let mut tx = manager.begin().unwrap();
        table.delete(&mut tx, "r", "cf", "q").unwrap();
        manager.commit(&mut tx).unwrap();

        let reader = manager.begin().unwrap();
        assert_eq!(table.get(&reader, "r", "cf", "q").unwrap(), None);
    }

    #[test]
    fn commit_table_only_commit_is_visible() {
        let (store, commit_table, manager) = setup();
        let table = TransactionalTable::new(&manager, "t");

        // A writer that committed but never wrote its shadow cell.
        let writer = manager.begin().unwrap();
        let start_ts = writer.start_timestamp();
        store
            .put("t", CellKey::new("r", "cf", "q"), start_ts.as_u64(), b"old".to_vec())
            .unwrap();
        commit_table.client().put(start_ts, start_ts.next()).unwrap();

        // Started exactly at the commit timestamp: not yet visible.
        let early = manager.begin().unwrap();
        assert_eq!(early.start_timestamp(), start_ts.next());
        assert_eq!(table.get(&early, "r", "cf", "q").unwrap(), None);

        let late = manager.begin().unwrap();
        assert_eq!(table.get(&late, "r", "cf", "q").unwrap(), Some(b"old".to_vec()));
    }

    #[test]
    fn reserved_inputs_are_rejected() {
        let (_, _, manager) = setup();
        let table = TransactionalTable::new(&manager, "t");
        let mut tx = manager.begin().unwrap();

        assert!(matches!(
            table.put(&mut tx, "r", "cf", "q", Vec::new()),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            table.put(&mut tx, "r", "cf", "q:SITX_CTS", b"x".to_vec()),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(tx.write_count(), 0);
    }
}
