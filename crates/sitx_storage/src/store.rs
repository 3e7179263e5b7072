//! Versioned key-value store trait definition.

use crate::cell::{CellKey, FamilyDescriptor, StoredCell};
use crate::error::StorageResult;

/// Kind of compaction being run over a column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompactionKind {
    /// Merges a subset of files; delete markers must be kept.
    Minor,
    /// Rewrites the whole family; delete markers may be purged.
    Major,
}

impl CompactionKind {
    /// Returns true for major compactions.
    #[must_use]
    pub const fn is_major(self) -> bool {
        matches!(self, Self::Major)
    }
}

/// A multi-version key-value store.
///
/// Cells are addressed by `(table, row, family, qualifier, version)`. The
/// store has no notion of transactions: versions are plain numbers chosen by
/// the writer, and a value is a plain byte string.
///
/// # Buffered writes
///
/// Implementations may buffer `put` and `delete_version` per table. Buffered
/// mutations are not visible to reads until [`VersionedStore::flush`] is
/// called for that table.
///
/// # Compaction
///
/// Compaction is split in two so that a filter can sit between the store and
/// its native merge: [`VersionedStore::compaction_input`] yields every stored
/// version of a family in store order, the caller decides which of them to
/// retain, and [`VersionedStore::finish_compaction`] runs the native merge
/// over the retained set. Mutations that arrive between the two calls are
/// never touched.
pub trait VersionedStore: Send + Sync {
    /// Returns the metadata of a column family.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or family does not exist.
    fn family_descriptor(&self, table: &str, family: &[u8]) -> StorageResult<FamilyDescriptor>;

    /// Reads the value stored at exactly `version`.
    ///
    /// Versions masked by a delete marker read as absent.
    fn get(&self, table: &str, key: &CellKey, version: u64) -> StorageResult<Option<Vec<u8>>>;

    /// Returns every readable version at or below `max_version`, newest first.
    fn versions(
        &self,
        table: &str,
        key: &CellKey,
        max_version: u64,
    ) -> StorageResult<Vec<(u64, Vec<u8>)>>;

    /// Writes `value` at exactly `version`, replacing any previous value there.
    fn put(&self, table: &str, key: CellKey, version: u64, value: Vec<u8>) -> StorageResult<()>;

    /// Deletes exactly one version by writing a delete marker for it.
    fn delete_version(&self, table: &str, key: &CellKey, version: u64) -> StorageResult<()>;

    /// Makes all buffered mutations of `table` visible and durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered mutations could not be applied; the
    /// caller must assume any subset of them may have been applied.
    fn flush(&self, table: &str) -> StorageResult<()>;

    /// Returns every stored version of a family, in store order, as input to
    /// a compaction.
    fn compaction_input(&self, table: &str, family: &[u8]) -> StorageResult<Vec<StoredCell>>;

    /// Completes a compaction: every input cell absent from `retained` is
    /// removed and the store's native merge runs for `kind`.
    fn finish_compaction(
        &self,
        table: &str,
        family: &[u8],
        kind: CompactionKind,
        input: &[StoredCell],
        retained: &[StoredCell],
    ) -> StorageResult<()>;
}
