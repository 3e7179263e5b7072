//! Storage capabilities the transaction layer needs from a backend.
//!
//! The transaction manager is generic over an opaque cell identifier. A
//! backend supplies a small set of point operations over those identifiers
//! and knows where a cell's shadow cell lives; everything else (shadow cell
//! encoding, resolution, cleanup policy) stays in this crate.

use crate::shadow::add_shadow_cell_suffix;
use crate::types::Timestamp;
use sitx_storage::{CellKey, StorageResult, VersionedStore};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Identifies a storage coordinate independent of time.
///
/// Many versions may exist at one cell. A cell belongs to exactly one
/// flush target, the unit whose buffered writes are flushed together.
pub trait CellId: Clone + Eq + Hash + fmt::Debug + Send + Sync {
    /// The unit of buffered writes a cell belongs to.
    type Target: Clone + Eq + Hash + fmt::Debug + Send + Sync;

    /// Returns the flush target of this cell.
    fn target(&self) -> Self::Target;
}

/// Point operations a storage backend offers to the transaction layer.
pub trait TransactionalBackend: Send + Sync {
    /// The backend's cell identifier.
    type Cell: CellId;

    /// Reads the value stored at exactly `version`.
    fn read(&self, cell: &Self::Cell, version: Timestamp) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` at exactly `version`.
    fn write(&self, cell: &Self::Cell, version: Timestamp, value: Vec<u8>) -> StorageResult<()>;

    /// Deletes exactly one version of a cell.
    fn delete_version(&self, cell: &Self::Cell, version: Timestamp) -> StorageResult<()>;

    /// Flushes the buffered writes of one target.
    fn flush(&self, target: &<Self::Cell as CellId>::Target) -> StorageResult<()>;

    /// Returns the coordinate of the shadow cell paired with `cell`.
    fn shadow_cell(&self, cell: &Self::Cell) -> Self::Cell;
}

/// A cell in a [`VersionedStore`] table.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KvCellId {
    /// Table name; also the flush target.
    pub table: String,
    /// Row, family and qualifier.
    pub key: CellKey,
}

impl KvCellId {
    /// Creates a cell identifier.
    pub fn new(table: impl Into<String>, key: CellKey) -> Self {
        Self {
            table: table.into(),
            key,
        }
    }
}

impl fmt::Debug for KvCellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.table, self.key)
    }
}

impl CellId for KvCellId {
    type Target = String;

    fn target(&self) -> String {
        self.table.clone()
    }
}

/// [`TransactionalBackend`] over any [`VersionedStore`].
#[derive(Clone)]
pub struct KvBackend {
    store: Arc<dyn VersionedStore>,
}

impl KvBackend {
    /// Wraps a store.
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }
}

impl fmt::Debug for KvBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvBackend").finish_non_exhaustive()
    }
}

impl TransactionalBackend for KvBackend {
    type Cell = KvCellId;

    fn read(&self, cell: &KvCellId, version: Timestamp) -> StorageResult<Option<Vec<u8>>> {
        self.store.get(&cell.table, &cell.key, version.as_u64())
    }

    fn write(&self, cell: &KvCellId, version: Timestamp, value: Vec<u8>) -> StorageResult<()> {
        self.store
            .put(&cell.table, cell.key.clone(), version.as_u64(), value)
    }

    fn delete_version(&self, cell: &KvCellId, version: Timestamp) -> StorageResult<()> {
        self.store
            .delete_version(&cell.table, &cell.key, version.as_u64())
    }

    fn flush(&self, target: &String) -> StorageResult<()> {
        self.store.flush(target)
    }

    fn shadow_cell(&self, cell: &KvCellId) -> KvCellId {
        KvCellId {
            table: cell.table.clone(),
            key: cell
                .key
                .with_qualifier(add_shadow_cell_suffix(&cell.key.qualifier)),
        }
    }
}
