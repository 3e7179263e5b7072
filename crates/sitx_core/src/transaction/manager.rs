//! Transaction manager.

use crate::backend::TransactionalBackend;
use crate::commit_table::CommitTable;
use crate::config::TransactionManagerConfig;
use crate::error::{CoreError, CoreResult};
use crate::resolver::{BackendLocator, CommitCache, CommitTimestampResolver, Location, Resolution};
use crate::shadow;
use crate::transaction::state::Transaction;
use crate::tso_client::TsoClient;
use crate::types::{CommitOutcome, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Orchestrates the transaction lifecycle over one storage backend.
///
/// The manager provides:
/// - Start timestamps from the timestamp oracle via `begin()`
/// - Flushing of every touched target before a decision is requested
/// - Shadow cell writes after a durable commit
/// - Best-effort cleanup of aborted writes
/// - Commit resolution for read paths via `is_committed()` and `resolve()`
///
/// ## Handles
///
/// A [`Transaction`] is bound to the manager that created it. Passing it to
/// another manager is rejected with [`CoreError::InvalidArgument`] before
/// anything is touched.
///
/// ## Unknown outcomes
///
/// If the oracle cannot be reached during `commit()` the decision may or may
/// not have been made durable. The transaction stays active, its writes are
/// left in place, and callers learn the outcome later through
/// [`TransactionManager::is_committed`].
pub struct TransactionManager<B: TransactionalBackend> {
    id: u64,
    backend: Arc<B>,
    tso: Arc<dyn TsoClient>,
    commit_table: Arc<dyn CommitTable>,
    config: TransactionManagerConfig,
}

impl<B: TransactionalBackend> TransactionManager<B> {
    /// Creates a new transaction manager.
    pub fn new(
        backend: Arc<B>,
        tso: Arc<dyn TsoClient>,
        commit_table: Arc<dyn CommitTable>,
        config: TransactionManagerConfig,
    ) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            tso,
            commit_table,
            config,
        }
    }

    /// Returns the storage backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TransactionManagerConfig {
        &self.config
    }

    /// Begins a new transaction.
    pub fn begin(&self) -> CoreResult<Transaction<B::Cell>> {
        let start_ts = self.tso.start_timestamp()?;
        debug!(%start_ts, "transaction started");
        Ok(Transaction::new(self.id, start_ts))
    }

    /// Writes `value` to `cell` at the transaction's start timestamp and adds
    /// the cell to its write set.
    ///
    /// The cell is recorded before the write is attempted so that a partial
    /// failure is still covered by cleanup.
    pub fn write(
        &self,
        tx: &mut Transaction<B::Cell>,
        cell: B::Cell,
        value: Vec<u8>,
    ) -> CoreResult<()> {
        self.check_handle(tx)?;
        tx.record_write(cell.clone())?;
        self.backend.write(&cell, tx.start_timestamp(), value)?;
        Ok(())
    }

    /// Commits a transaction.
    ///
    /// Returns the commit timestamp once the decision is durable. Shadow
    /// cells are written afterwards; their failures never fail the commit.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidArgument`] for a handle from another manager
    /// - [`CoreError::InvalidOperation`] if the transaction is not active
    /// - [`CoreError::TransactionFlush`] if pending writes could not be flushed
    /// - [`CoreError::TransactionAborted`] if the oracle aborted it
    pub fn commit(&self, tx: &mut Transaction<B::Cell>) -> CoreResult<Timestamp> {
        self.check_handle(tx)?;
        tx.ensure_active()?;

        if let Err(e) = self.pre_commit(tx) {
            tx.mark_aborted();
            return Err(e);
        }

        let start_ts = tx.start_timestamp();
        match self.tso.commit(start_ts)? {
            CommitOutcome::Committed(commit_ts) => {
                tx.mark_committed(commit_ts);
                let complete = self.update_shadow_cells(tx);
                if complete && self.config.complete_after_shadow_cells {
                    if let Err(e) = self.commit_table.complete_transaction(start_ts) {
                        warn!(%start_ts, error = %e, "failed completing commit table entry");
                    }
                }
                debug!(%start_ts, %commit_ts, "transaction committed");
                Ok(commit_ts)
            }
            CommitOutcome::Aborted => {
                tx.mark_aborted();
                self.cleanup(tx);
                Err(CoreError::transaction_aborted(
                    start_ts,
                    "timestamp oracle decided to abort",
                ))
            }
        }
    }

    /// Rolls a transaction back and removes its writes.
    pub fn rollback(&self, tx: &mut Transaction<B::Cell>) -> CoreResult<()> {
        self.check_handle(tx)?;
        tx.ensure_active()?;

        if let Err(e) = self.pre_rollback(tx) {
            tx.mark_aborted();
            return Err(e);
        }

        let start_ts = tx.start_timestamp();
        self.tso.abort(start_ts)?;
        tx.mark_aborted();
        self.cleanup(tx);
        debug!(%start_ts, "transaction rolled back");
        Ok(())
    }

    /// Flushes every target touched by the transaction before a commit.
    ///
    /// On failure the transaction's writes are cleaned up (best effort) and
    /// [`CoreError::TransactionFlush`] is returned.
    pub fn pre_commit(&self, tx: &Transaction<B::Cell>) -> CoreResult<()> {
        self.check_handle(tx)?;
        self.flush_targets(tx)
    }

    /// Flushes every target touched by the transaction before a rollback.
    pub fn pre_rollback(&self, tx: &Transaction<B::Cell>) -> CoreResult<()> {
        self.check_handle(tx)?;
        self.flush_targets(tx)
    }

    /// Deletes the exact version of every written cell.
    ///
    /// Failures are logged only: the transaction is already provably
    /// aborted by the absence of a commit record.
    pub fn cleanup(&self, tx: &Transaction<B::Cell>) {
        let start_ts = tx.start_timestamp();
        for cell in tx.write_set() {
            if let Err(e) = self.backend.delete_version(cell, start_ts) {
                warn!(?cell, %start_ts, error = %e, "failed cleanup cell");
            }
        }
        for target in tx.written_targets() {
            if let Err(e) = self.backend.flush(&target) {
                warn!(?target, %start_ts, error = %e, "failed flushing cleanup");
            }
        }
    }

    /// Writes shadow cells for a committed transaction's write set.
    ///
    /// Returns true if every shadow cell was written. Failures are logged only.
    pub fn update_shadow_cells(&self, tx: &Transaction<B::Cell>) -> bool {
        let Some(commit_ts) = tx.commit_timestamp() else {
            warn!(start_ts = %tx.start_timestamp(), "shadow cells requested for uncommitted transaction");
            return false;
        };
        shadow::write_shadow_cells(
            self.backend.as_ref(),
            tx.write_set(),
            tx.start_timestamp(),
            commit_ts,
        )
    }

    /// Resolves the version of `cell` written at `version`.
    ///
    /// `cache` is shared across the versions examined by one read.
    pub fn resolve(
        &self,
        cell: &B::Cell,
        version: Timestamp,
        cache: &mut CommitCache,
    ) -> CoreResult<Resolution> {
        let mut locator = BackendLocator::new(self.backend.as_ref(), cell, cache)
            .with_backfill(self.config.backfill_shadow_cells);
        CommitTimestampResolver::new(self.commit_table.as_ref()).resolve(version, &mut locator)
    }

    /// Returns true if the version of `cell` written at `version` committed.
    ///
    /// Aborted and undetermined versions both read as not committed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InternalDefect`] if the resolver claims a cache
    /// hit even though the cache used for this check starts empty.
    pub fn is_committed(&self, cell: &B::Cell, version: Timestamp) -> CoreResult<bool> {
        let mut cache = CommitCache::new();
        match self.resolve(cell, version, &mut cache)? {
            Resolution::Committed {
                location: Location::ShadowCell | Location::CommitTable,
                ..
            } => Ok(true),
            Resolution::Aborted | Resolution::Undetermined => Ok(false),
            Resolution::Committed {
                location: Location::Cache,
                ..
            } => {
                error!(?cell, %version, "commit timestamp resolved from an empty cache");
                Err(CoreError::internal_defect(format!(
                    "cache hit for {version} with an empty commit cache"
                )))
            }
        }
    }

    /// Reads the current low watermark.
    pub fn low_watermark(&self) -> CoreResult<Timestamp> {
        self.commit_table.read_low_watermark().map_err(|e| match e {
            CoreError::Io(_) => e,
            other => CoreError::io("error reading low watermark", other),
        })
    }

    pub(crate) fn check_handle(&self, tx: &Transaction<B::Cell>) -> CoreResult<()> {
        if tx.manager_id() == self.id {
            Ok(())
        } else {
            Err(CoreError::invalid_argument(format!(
                "transaction {} was not created by this manager",
                tx.start_timestamp()
            )))
        }
    }

    fn flush_targets(&self, tx: &Transaction<B::Cell>) -> CoreResult<()> {
        for target in tx.written_targets() {
            if let Err(source) = self.backend.flush(&target) {
                warn!(?target, start_ts = %tx.start_timestamp(), error = %source, "exception while flushing writes");
                self.cleanup(tx);
                return Err(CoreError::TransactionFlush {
                    start_ts: tx.start_timestamp(),
                    source,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
