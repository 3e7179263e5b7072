use super::pool::{CommitTableClientPool, CommitTableFactory};
use super::scanner::{CompactionStats, CompactorScanner};
use crate::config::CompactorConfig;
use crate::error::CoreResult;
use sitx_storage::{CompactionKind, StoredCell, VersionedStore};
use tracing::{debug, info};

/// Garbage collector hooked into store compactions.
///
/// Only column families flagged as transaction-managed are filtered; any
/// other family is left for the store to compact on its own.
#[derive(Debug)]
pub struct Compactor {
    config: CompactorConfig,
    pool: CommitTableClientPool,
}

impl Compactor {
    /// Creates a compactor. Commit table clients are opened on demand.
    pub fn new(config: CompactorConfig, factory: CommitTableFactory) -> Self {
        let pool = CommitTableClientPool::new(
            factory,
            config.effective_commit_table_name(),
            config.client_pool_size,
            config.acquire_timeout,
        );
        info!(
            commit_table = config.effective_commit_table_name(),
            retain_tombstones = config.retain_tombstones,
            "compactor started"
        );
        Self { config, pool }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }

    /// Returns the commit table client pool.
    #[must_use]
    pub fn pool(&self) -> &CommitTableClientPool {
        &self.pool
    }

    /// Compacts one column family.
    ///
    /// Returns `None` if the family is not transaction-managed, in which
    /// case the store was not touched.
    ///
    /// # Errors
    ///
    /// Any failure leaves the family exactly as it was: the native merge
    /// only runs once every row has been filtered.
    pub fn compact(
        &self,
        store: &dyn VersionedStore,
        table: &str,
        family: &[u8],
        kind: CompactionKind,
    ) -> CoreResult<Option<CompactionStats>> {
        let descriptor = store.family_descriptor(table, family)?;
        if !descriptor.is_transactional() {
            debug!(table, family = %String::from_utf8_lossy(family), "family not transactional, skipping");
            return Ok(None);
        }

        let input = store.compaction_input(table, family)?;

        // The client goes back to the pool before the merge runs.
        let (retained, stats, low_watermark) = {
            let client = self.pool.acquire()?;
            let mut scanner =
                CompactorScanner::new(&*client, kind, self.config.retain_tombstones)?;
            let mut retained: Vec<StoredCell> = Vec::with_capacity(input.len());
            for row in input.chunk_by(|a, b| a.key.row == b.key.row) {
                retained.extend(scanner.filter_row(row)?);
            }
            (retained, scanner.stats(), scanner.low_watermark())
        };

        store.finish_compaction(table, family, kind, &input, &retained)?;

        info!(
            table,
            family = %String::from_utf8_lossy(family),
            ?kind,
            %low_watermark,
            rows = stats.rows,
            cells_in = stats.cells_in,
            cells_out = stats.cells_out,
            "compaction filtered"
        );
        Ok(Some(stats))
    }

    /// Closes idle pooled clients.
    pub fn stop(&self) {
        info!("stopping compactor");
        self.pool.close();
        info!("compactor stopped");
    }
}

impl Drop for Compactor {
    fn drop(&mut self) {
        self.pool.close();
    }
}
