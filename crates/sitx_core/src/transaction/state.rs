//! Transaction state.

use crate::backend::CellId;
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use std::collections::HashSet;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A snapshot-isolated transaction.
///
/// Reads see every transaction that committed before `start_timestamp`.
/// Writes land in storage immediately at version = start timestamp and stay
/// invisible to others until the commit decision is durable.
///
/// A transaction is owned by the caller that began it and is bound to the
/// [`crate::TransactionManager`] that created it.
#[derive(Debug)]
pub struct Transaction<C: CellId> {
    manager_id: u64,
    start_ts: Timestamp,
    commit_ts: Option<Timestamp>,
    status: TransactionStatus,
    write_set: HashSet<C>,
}

impl<C: CellId> Transaction<C> {
    pub(crate) fn new(manager_id: u64, start_ts: Timestamp) -> Self {
        Self {
            manager_id,
            start_ts,
            commit_ts: None,
            status: TransactionStatus::Active,
            write_set: HashSet::new(),
        }
    }

    /// Returns the start timestamp, which doubles as the transaction id.
    #[must_use]
    pub fn start_timestamp(&self) -> Timestamp {
        self.start_ts
    }

    /// Returns the commit timestamp once committed.
    #[must_use]
    pub fn commit_timestamp(&self) -> Option<Timestamp> {
        self.commit_ts
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Returns the cells written so far.
    pub fn write_set(&self) -> impl Iterator<Item = &C> {
        self.write_set.iter()
    }

    /// Returns true if this transaction wrote `cell`.
    #[must_use]
    pub fn has_written(&self, cell: &C) -> bool {
        self.write_set.contains(cell)
    }

    /// Returns the number of distinct cells written.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Returns every flush target touched by the write set.
    #[must_use]
    pub fn written_targets(&self) -> HashSet<C::Target> {
        self.write_set.iter().map(CellId::target).collect()
    }

    pub(crate) fn manager_id(&self) -> u64 {
        self.manager_id
    }

    pub(crate) fn record_write(&mut self, cell: C) -> CoreResult<()> {
        self.ensure_active()?;
        self.write_set.insert(cell);
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self, commit_ts: Timestamp) {
        self.commit_ts = Some(commit_ts);
        self.status = TransactionStatus::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.status = TransactionStatus::Aborted;
    }

    /// Ensures the transaction is active.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Committed => Err(CoreError::invalid_operation(format!(
                "transaction {} already committed",
                self.start_ts
            ))),
            TransactionStatus::Aborted => Err(CoreError::invalid_operation(format!(
                "transaction {} already aborted",
                self.start_ts
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KvCellId;
    use sitx_storage::CellKey;

    fn create_txn() -> Transaction<KvCellId> {
        Transaction::new(1, Timestamp::new(100))
    }

    fn cell(table: &str, q: &str) -> KvCellId {
        KvCellId::new(table, CellKey::new("row1", "cf", q))
    }

    #[test]
    fn new_transaction_is_active() {
        let txn = create_txn();
        assert!(txn.is_active());
        assert_eq!(txn.status(), TransactionStatus::Active);
        assert_eq!(txn.commit_timestamp(), None);
    }

    #[test]
    fn write_set_is_a_set() {
        let mut txn = create_txn();
        txn.record_write(cell("a", "q")).unwrap();
        txn.record_write(cell("a", "q")).unwrap();
        txn.record_write(cell("b", "q")).unwrap();

        assert_eq!(txn.write_count(), 2);
        assert!(txn.has_written(&cell("b", "q")));
        assert_eq!(txn.written_targets().len(), 2);
    }

    #[test]
    fn finished_transaction_rejects_writes() {
        let mut txn = create_txn();
        txn.mark_committed(Timestamp::new(105));
        assert_eq!(txn.commit_timestamp(), Some(Timestamp::new(105)));

        let result = txn.record_write(cell("a", "q"));
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn aborted_transaction_rejects_writes() {
        let mut txn = create_txn();
        txn.mark_aborted();
        assert!(txn.ensure_active().is_err());
    }
}
