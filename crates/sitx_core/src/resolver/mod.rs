//! Commit timestamp resolution.
//!
//! Given the version timestamp of a stored cell (which is the writer's start
//! timestamp), the resolver decides whether the writer committed, aborted or
//! is still undetermined. Sources are consulted in strict priority order:
//!
//! 1. The caller's short-lived [`CommitCache`] (no I/O)
//! 2. The shadow cell at the exact version
//! 3. The commit table
//! 4. The low watermark: a version with no commit record below it is aborted
//!
//! The low watermark is read *before* the commit table lookup, and a miss in
//! the commit table re-checks the shadow cell. A committer may write its
//! shadow cells and then remove its commit table entry between our two
//! reads; the re-check closes that window. Because the watermark is read
//! first, a stale value can only turn an abort into an undetermined verdict,
//! never the other way round.

mod locator;

pub use locator::BackendLocator;

use crate::commit_table::CommitTable;
use crate::error::CoreResult;
use crate::types::Timestamp;
use std::collections::HashMap;
use tracing::warn;

/// Where a commit timestamp was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// The caller's commit cache.
    Cache,
    /// A shadow cell next to the data.
    ShadowCell,
    /// The commit table.
    CommitTable,
}

/// Verdict for one stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The writer committed at `commit_ts`.
    Committed {
        /// The writer's commit timestamp.
        commit_ts: Timestamp,
        /// Where it was found.
        location: Location,
    },
    /// No commit record exists and the version is below the low watermark.
    Aborted,
    /// No commit record exists yet; the writer may still be active.
    Undetermined,
}

impl Resolution {
    /// Returns the commit timestamp of a committed verdict.
    #[must_use]
    pub fn commit_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Committed { commit_ts, .. } => Some(*commit_ts),
            Self::Aborted | Self::Undetermined => None,
        }
    }

    /// Returns true for a committed verdict.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Start timestamp to commit timestamp cache scoped to one read.
#[derive(Debug, Clone, Default)]
pub struct CommitCache {
    entries: HashMap<Timestamp, Timestamp>,
}

impl CommitCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a start timestamp.
    #[must_use]
    pub fn get(&self, start_ts: Timestamp) -> Option<Timestamp> {
        self.entries.get(&start_ts).copied()
    }

    /// Records a resolved commit.
    pub fn insert(&mut self, start_ts: Timestamp, commit_ts: Timestamp) {
        self.entries.insert(start_ts, commit_ts);
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-cell access to the cheap commit timestamp sources.
///
/// A locator is bound to one stored cell. It answers cache and shadow cell
/// lookups for that cell and is told about every commit timestamp the
/// resolver finds elsewhere.
pub trait CommitTimestampLocator {
    /// Looks the start timestamp up in the cache.
    fn read_from_cache(&self, start_ts: Timestamp) -> Option<Timestamp>;

    /// Reads the shadow cell at version `start_ts`.
    fn read_from_shadow_cell(&mut self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>>;

    /// Called with every commit timestamp found outside the cache.
    fn remember(&mut self, start_ts: Timestamp, commit_ts: Timestamp);

    /// Called when the commit table answered and no shadow cell exists.
    fn backfill_shadow_cell(&mut self, _start_ts: Timestamp, _commit_ts: Timestamp) {}
}

/// Resolves stored versions against a commit table.
pub struct CommitTimestampResolver<'a> {
    commit_table: &'a dyn CommitTable,
}

impl<'a> CommitTimestampResolver<'a> {
    /// Creates a resolver reading from `commit_table`.
    pub fn new(commit_table: &'a dyn CommitTable) -> Self {
        Self { commit_table }
    }

    /// Resolves the version written at `start_ts`.
    ///
    /// # Errors
    ///
    /// Commit table failures are returned as I/O-kind errors; a malformed
    /// shadow cell is returned as [`crate::CoreError::CorruptedCommitTimestamp`].
    pub fn resolve<L>(&self, start_ts: Timestamp, locator: &mut L) -> CoreResult<Resolution>
    where
        L: CommitTimestampLocator + ?Sized,
    {
        if let Some(commit_ts) = locator.read_from_cache(start_ts) {
            return Ok(Resolution::Committed {
                commit_ts,
                location: Location::Cache,
            });
        }

        if let Some(commit_ts) = locator.read_from_shadow_cell(start_ts)? {
            locator.remember(start_ts, commit_ts);
            return Ok(Resolution::Committed {
                commit_ts,
                location: Location::ShadowCell,
            });
        }

        let low_watermark = self
            .commit_table
            .read_low_watermark()
            .inspect_err(|e| warn!(%start_ts, error = %e, "failed reading low watermark"))?;

        let committed = self
            .commit_table
            .get_commit_timestamp(start_ts)
            .inspect_err(|e| warn!(%start_ts, error = %e, "failed reading commit table"))?;

        if let Some(commit_ts) = committed {
            locator.remember(start_ts, commit_ts);
            locator.backfill_shadow_cell(start_ts, commit_ts);
            return Ok(Resolution::Committed {
                commit_ts,
                location: Location::CommitTable,
            });
        }

        // The entry may have been completed after its shadow cell landed.
        if let Some(commit_ts) = locator.read_from_shadow_cell(start_ts)? {
            locator.remember(start_ts, commit_ts);
            return Ok(Resolution::Committed {
                commit_ts,
                location: Location::ShadowCell,
            });
        }

        if start_ts < low_watermark {
            Ok(Resolution::Aborted)
        } else {
            Ok(Resolution::Undetermined)
        }
    }
}

#[cfg(test)]
mod tests;
