//! Client-side configuration.
//!
//! Values are read once at startup by whatever loads configuration and
//! passed in as plain structs.

use std::time::Duration;

/// Default name of the commit table.
pub const DEFAULT_COMMIT_TABLE_NAME: &str = "COMMIT_TABLE";

/// Configuration for a [`crate::TransactionManager`].
#[derive(Debug, Clone)]
pub struct TransactionManagerConfig {
    /// Whether a read that resolves a version through the commit table
    /// writes the missing shadow cell back.
    pub backfill_shadow_cells: bool,

    /// Whether a commit removes its commit table entry once every shadow
    /// cell of the write set has been written.
    pub complete_after_shadow_cells: bool,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            backfill_shadow_cells: false,
            complete_after_shadow_cells: false,
        }
    }
}

impl TransactionManagerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether reads backfill missing shadow cells.
    #[must_use]
    pub const fn backfill_shadow_cells(mut self, value: bool) -> Self {
        self.backfill_shadow_cells = value;
        self
    }

    /// Sets whether commits complete their commit table entry.
    #[must_use]
    pub const fn complete_after_shadow_cells(mut self, value: bool) -> Self {
        self.complete_after_shadow_cells = value;
        self
    }
}

/// Configuration for the compaction garbage collector.
#[derive(Debug, Clone)]
pub struct CompactorConfig {
    /// Keep non-transactional delete markers through major compactions.
    pub retain_tombstones: bool,

    /// Overrides the commit table location; `None` uses
    /// [`DEFAULT_COMMIT_TABLE_NAME`].
    pub commit_table_name: Option<String>,

    /// Upper bound on commit table clients owned by the pool.
    pub client_pool_size: usize,

    /// How long a compaction waits for a pooled client.
    pub acquire_timeout: Duration,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            retain_tombstones: true,
            commit_table_name: None,
            client_pool_size: 4,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl CompactorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether delete markers survive major compactions.
    #[must_use]
    pub const fn retain_tombstones(mut self, value: bool) -> Self {
        self.retain_tombstones = value;
        self
    }

    /// Overrides the commit table name.
    #[must_use]
    pub fn commit_table_name(mut self, name: impl Into<String>) -> Self {
        self.commit_table_name = Some(name.into());
        self
    }

    /// Sets the client pool size (at least one).
    #[must_use]
    pub const fn client_pool_size(mut self, size: usize) -> Self {
        self.client_pool_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets how long to wait for a pooled client.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Returns the effective commit table name.
    #[must_use]
    pub fn effective_commit_table_name(&self) -> &str {
        self.commit_table_name
            .as_deref()
            .unwrap_or(DEFAULT_COMMIT_TABLE_NAME)
    }
}
