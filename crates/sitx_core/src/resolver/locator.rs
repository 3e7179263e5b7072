use super::{CommitCache, CommitTimestampLocator};
use crate::backend::TransactionalBackend;
use crate::error::CoreResult;
use crate::shadow;
use crate::types::Timestamp;
use tracing::warn;

/// Locator reading shadow cells through a [`TransactionalBackend`].
pub struct BackendLocator<'a, B: TransactionalBackend + ?Sized> {
    backend: &'a B,
    cell: &'a B::Cell,
    cache: &'a mut CommitCache,
    backfill: bool,
}

impl<'a, B: TransactionalBackend + ?Sized> BackendLocator<'a, B> {
    /// Creates a locator for `cell`, sharing `cache` with the rest of the read.
    pub fn new(backend: &'a B, cell: &'a B::Cell, cache: &'a mut CommitCache) -> Self {
        Self {
            backend,
            cell,
            cache,
            backfill: false,
        }
    }

    /// Writes missing shadow cells back when the commit table answers.
    #[must_use]
    pub fn with_backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }
}

impl<B: TransactionalBackend + ?Sized> CommitTimestampLocator for BackendLocator<'_, B> {
    fn read_from_cache(&self, start_ts: Timestamp) -> Option<Timestamp> {
        self.cache.get(start_ts)
    }

    fn read_from_shadow_cell(&mut self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
        shadow::read_shadow_cell(self.backend, self.cell, start_ts)
    }

    fn remember(&mut self, start_ts: Timestamp, commit_ts: Timestamp) {
        self.cache.insert(start_ts, commit_ts);
    }

    fn backfill_shadow_cell(&mut self, start_ts: Timestamp, commit_ts: Timestamp) {
        if !self.backfill {
            return;
        }
        if let Err(e) = shadow::write_shadow_cell(self.backend, self.cell, start_ts, commit_ts) {
            warn!(cell = ?self.cell, %start_ts, error = %e, "failed backfilling shadow cell");
        }
    }
}
