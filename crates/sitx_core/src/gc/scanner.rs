//! Row-by-row version filter run during compaction.

use crate::commit_table::CommitTable;
use crate::error::CoreResult;
use crate::resolver::{CommitCache, CommitTimestampLocator, CommitTimestampResolver, Resolution};
use crate::shadow::{decode_commit_timestamp, strip_shadow_cell_suffix};
use crate::types::Timestamp;
use sitx_storage::{CellKey, CompactionKind, StoredCell};
use std::collections::{HashMap, HashSet};

/// Counters for one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Rows examined.
    pub rows: u64,
    /// Stored cells fed into the filter.
    pub cells_in: u64,
    /// Stored cells retained.
    pub cells_out: u64,
    /// Versions dropped because their writer aborted.
    pub aborted_dropped: u64,
    /// Committed versions no reader can see any more.
    pub superseded_dropped: u64,
    /// Shadow cells dropped with their data version.
    pub shadow_cells_dropped: u64,
    /// Delete markers dropped by a major compaction.
    pub tombstones_dropped: u64,
}

impl CompactionStats {
    /// Returns the number of cells dropped.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.cells_in - self.cells_out
    }
}

/// Filters the versions of each row before the store's native merge.
///
/// For every data version the scanner asks the resolver for a verdict:
/// aborted versions are dropped, undetermined ones are kept, and among the
/// versions of a cell committed below the low watermark only the one with
/// the highest start timestamp survives, together with everything committed
/// at or above the watermark. Snapshot reads walk versions by start
/// timestamp, so that survivor is what every reader at or above the
/// watermark finds first. A shadow cell follows its data version.
///
/// The scanner never merges: it only decides which input cells to keep.
pub struct CompactorScanner<'a> {
    resolver: CommitTimestampResolver<'a>,
    low_watermark: Timestamp,
    kind: CompactionKind,
    retain_tombstones: bool,
    stats: CompactionStats,
}

impl<'a> CompactorScanner<'a> {
    /// Creates a scanner for one pass, reading the low watermark once.
    ///
    /// A stale watermark only delays pruning.
    pub fn new(
        commit_table: &'a dyn CommitTable,
        kind: CompactionKind,
        retain_tombstones: bool,
    ) -> CoreResult<Self> {
        let low_watermark = commit_table.read_low_watermark()?;
        Ok(Self {
            resolver: CommitTimestampResolver::new(commit_table),
            low_watermark,
            kind,
            retain_tombstones,
            stats: CompactionStats::default(),
        })
    }

    /// Returns the low watermark this pass prunes against.
    #[must_use]
    pub fn low_watermark(&self) -> Timestamp {
        self.low_watermark
    }

    /// Returns the counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> CompactionStats {
        self.stats
    }

    /// Filters one row, given in store order, and returns the cells to keep.
    pub fn filter_row(&mut self, row: &[StoredCell]) -> CoreResult<Vec<StoredCell>> {
        self.stats.rows += 1;
        self.stats.cells_in += row.len() as u64;

        let mut shadows = RowShadowCells::default();
        for cell in row {
            if let (Some(data_qualifier), Some(value)) =
                (strip_shadow_cell_suffix(&cell.key.qualifier), cell.value())
            {
                let data_key = cell.key.with_qualifier(data_qualifier);
                shadows
                    .entries
                    .insert((data_key, cell.version), decode_commit_timestamp(value)?);
            }
        }

        // (data key, version) of every data put that survives.
        let mut kept_puts: HashSet<(CellKey, u64)> = HashSet::new();
        let mut data_puts: HashSet<(CellKey, u64)> = HashSet::new();
        let mut dropped: HashSet<&StoredCell> = HashSet::new();

        let mut start = 0;
        while start < row.len() {
            let key = &row[start].key;
            let end = start + row[start..].iter().take_while(|c| &c.key == key).count();
            if strip_shadow_cell_suffix(&key.qualifier).is_none() {
                self.filter_cell(&row[start..end], &mut shadows, &mut kept_puts, &mut dropped)?;
                for cell in row[start..end].iter().filter(|c| !c.is_tombstone()) {
                    data_puts.insert((cell.key.clone(), cell.version));
                }
            }
            start = end;
        }

        for cell in row {
            let Some(data_qualifier) = strip_shadow_cell_suffix(&cell.key.qualifier) else {
                continue;
            };
            let data = (cell.key.with_qualifier(data_qualifier), cell.version);
            let keep = if data_puts.contains(&data) {
                kept_puts.contains(&data)
            } else {
                // The data version may live in files outside a minor pass.
                !self.kind.is_major()
            };
            if !keep {
                self.stats.shadow_cells_dropped += 1;
                dropped.insert(cell);
            }
        }

        let retained: Vec<StoredCell> = row
            .iter()
            .filter(|c| !dropped.contains(c))
            .cloned()
            .collect();
        self.stats.cells_out += retained.len() as u64;
        Ok(retained)
    }

    /// Decides the versions of one data cell.
    fn filter_cell<'r>(
        &mut self,
        versions: &'r [StoredCell],
        shadows: &mut RowShadowCells,
        kept_puts: &mut HashSet<(CellKey, u64)>,
        dropped: &mut HashSet<&'r StoredCell>,
    ) -> CoreResult<()> {
        let mut committed = Vec::new();

        for cell in versions {
            if cell.is_tombstone() {
                if self.kind.is_major() && !self.retain_tombstones {
                    self.stats.tombstones_dropped += 1;
                    dropped.insert(cell);
                }
                continue;
            }

            shadows.current = Some(cell.key.clone());
            match self.resolver.resolve(Timestamp::new(cell.version), shadows)? {
                Resolution::Aborted => {
                    self.stats.aborted_dropped += 1;
                    dropped.insert(cell);
                }
                Resolution::Undetermined => {
                    kept_puts.insert((cell.key.clone(), cell.version));
                }
                Resolution::Committed { commit_ts, .. } => committed.push((cell, commit_ts)),
            }
        }

        let survivor = committed
            .iter()
            .filter(|(_, commit_ts)| *commit_ts < self.low_watermark)
            .map(|(cell, _)| cell.version)
            .max();

        for (cell, commit_ts) in committed {
            let superseded =
                commit_ts < self.low_watermark && Some(cell.version) != survivor;
            if superseded {
                self.stats.superseded_dropped += 1;
                dropped.insert(cell);
            } else {
                kept_puts.insert((cell.key.clone(), cell.version));
            }
        }
        Ok(())
    }
}

/// Shadow cells found in the row being compacted, plus a row-scoped cache.
#[derive(Default)]
struct RowShadowCells {
    entries: HashMap<(CellKey, u64), Timestamp>,
    cache: CommitCache,
    current: Option<CellKey>,
}

impl CommitTimestampLocator for RowShadowCells {
    fn read_from_cache(&self, start_ts: Timestamp) -> Option<Timestamp> {
        self.cache.get(start_ts)
    }

    fn read_from_shadow_cell(&mut self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
        let Some(key) = &self.current else {
            return Ok(None);
        };
        Ok(self.entries.get(&(key.clone(), start_ts.as_u64())).copied())
    }

    fn remember(&mut self, start_ts: Timestamp, commit_ts: Timestamp) {
        self.cache.insert(start_ts, commit_ts);
    }
}
