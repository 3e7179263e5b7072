//! In-memory versioned key-value store.

use crate::cell::{CellKey, CellKind, FamilyDescriptor, StoredCell};
use crate::error::{StorageError, StorageResult};
use crate::store::{CompactionKind, VersionedStore};
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What one `(cell, version)` slot currently holds.
#[derive(Debug, Default, Clone)]
struct Slot {
    value: Option<Vec<u8>>,
    deleted: bool,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.value.is_none() && !self.deleted
    }

    fn readable(&self) -> Option<&Vec<u8>> {
        if self.deleted {
            None
        } else {
            self.value.as_ref()
        }
    }
}

type VersionChain = BTreeMap<Reverse<u64>, Slot>;

#[derive(Debug, Default)]
struct Table {
    families: HashMap<Vec<u8>, FamilyDescriptor>,
    cells: BTreeMap<CellKey, VersionChain>,
    pending: Vec<StoredCell>,
    auto_flush: bool,
}

impl Table {
    fn apply(&mut self, mutation: StoredCell) {
        let slot = self
            .cells
            .entry(mutation.key)
            .or_default()
            .entry(Reverse(mutation.version))
            .or_default();
        match mutation.kind {
            CellKind::Put(value) => slot.value = Some(value),
            CellKind::Delete => slot.deleted = true,
        }
    }

    fn check_family(&self, table: &str, family: &[u8]) -> StorageResult<()> {
        if self.families.contains_key(family) {
            Ok(())
        } else {
            Err(StorageError::family_not_found(table, family))
        }
    }

    fn remove(&mut self, cell: &StoredCell) {
        let Some(chain) = self.cells.get_mut(&cell.key) else {
            return;
        };
        if let Some(slot) = chain.get_mut(&Reverse(cell.version)) {
            match &cell.kind {
                CellKind::Delete => slot.deleted = false,
                CellKind::Put(value) => {
                    if slot.value.as_ref() == Some(value) {
                        slot.value = None;
                    }
                }
            }
            if slot.is_empty() {
                chain.remove(&Reverse(cell.version));
            }
        }
        if chain.is_empty() {
            self.cells.remove(&cell.key);
        }
    }
}

/// An in-process multi-version store.
///
/// Tables are created with their column family descriptors. Each table
/// either applies mutations immediately (`auto_flush`, the default) or
/// buffers them until [`VersionedStore::flush`], which mirrors a client-side
/// write buffer.
///
/// # Example
///
/// ```rust
/// use sitx_storage::{CellKey, FamilyDescriptor, InMemoryStore, VersionedStore};
///
/// let store = InMemoryStore::new();
/// store.create_table("users", vec![FamilyDescriptor::transactional("cf")]);
///
/// let key = CellKey::new("row1", "cf", "name");
/// store.put("users", key.clone(), 10, b"ada".to_vec()).unwrap();
/// assert_eq!(store.get("users", &key, 10).unwrap(), Some(b"ada".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table with the given families.
    pub fn create_table(&self, name: &str, families: Vec<FamilyDescriptor>) {
        let table = Table {
            families: families
                .into_iter()
                .map(|f| (f.name().to_vec(), f))
                .collect(),
            auto_flush: true,
            ..Table::default()
        };
        self.tables.write().insert(name.to_string(), table);
    }

    /// Switches write buffering for a table.
    ///
    /// Turning auto-flush back on does not flush already-buffered mutations.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn set_auto_flush(&self, table: &str, auto_flush: bool) -> StorageResult<()> {
        self.with_table_mut(table, |t| {
            t.auto_flush = auto_flush;
            Ok(())
        })
    }

    /// Returns the number of buffered, not yet flushed mutations of a table.
    #[must_use]
    pub fn pending_mutations(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map_or(0, |t| t.pending.len())
    }

    /// Returns every stored version of a table in store order.
    ///
    /// Useful for assertions in tests.
    #[must_use]
    pub fn cells(&self, table: &str) -> Vec<StoredCell> {
        let tables = self.tables.read();
        let Some(t) = tables.get(table) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (key, chain) in &t.cells {
            emit_chain(key, chain, &mut out);
        }
        out
    }

    fn with_table<R>(&self, table: &str, f: impl FnOnce(&Table) -> StorageResult<R>) -> StorageResult<R> {
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        f(t)
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        f(t)
    }

    fn mutate(&self, table: &str, mutation: StoredCell) -> StorageResult<()> {
        self.with_table_mut(table, |t| {
            t.check_family(table, &mutation.key.family)?;
            if t.auto_flush {
                t.apply(mutation);
            } else {
                t.pending.push(mutation);
            }
            Ok(())
        })
    }
}

fn emit_chain(key: &CellKey, chain: &VersionChain, out: &mut Vec<StoredCell>) {
    for (Reverse(version), slot) in chain {
        if slot.deleted {
            out.push(StoredCell::tombstone(key.clone(), *version));
        }
        if let Some(value) = &slot.value {
            out.push(StoredCell::put(key.clone(), *version, value.clone()));
        }
    }
}

impl VersionedStore for InMemoryStore {
    fn family_descriptor(&self, table: &str, family: &[u8]) -> StorageResult<FamilyDescriptor> {
        self.with_table(table, |t| {
            t.families
                .get(family)
                .cloned()
                .ok_or_else(|| StorageError::family_not_found(table, family))
        })
    }

    fn get(&self, table: &str, key: &CellKey, version: u64) -> StorageResult<Option<Vec<u8>>> {
        self.with_table(table, |t| {
            Ok(t.cells
                .get(key)
                .and_then(|chain| chain.get(&Reverse(version)))
                .and_then(Slot::readable)
                .cloned())
        })
    }

    fn versions(
        &self,
        table: &str,
        key: &CellKey,
        max_version: u64,
    ) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        self.with_table(table, |t| {
            let Some(chain) = t.cells.get(key) else {
                return Ok(Vec::new());
            };
            Ok(chain
                .range(Reverse(max_version)..)
                .filter_map(|(Reverse(v), slot)| slot.readable().map(|value| (*v, value.clone())))
                .collect())
        })
    }

    fn put(&self, table: &str, key: CellKey, version: u64, value: Vec<u8>) -> StorageResult<()> {
        self.mutate(table, StoredCell::put(key, version, value))
    }

    fn delete_version(&self, table: &str, key: &CellKey, version: u64) -> StorageResult<()> {
        self.mutate(table, StoredCell::tombstone(key.clone(), version))
    }

    fn flush(&self, table: &str) -> StorageResult<()> {
        self.with_table_mut(table, |t| {
            let pending = std::mem::take(&mut t.pending);
            for mutation in pending {
                t.apply(mutation);
            }
            Ok(())
        })
    }

    fn compaction_input(&self, table: &str, family: &[u8]) -> StorageResult<Vec<StoredCell>> {
        self.with_table(table, |t| {
            t.check_family(table, family)?;
            let mut out = Vec::new();
            for (key, chain) in t.cells.iter().filter(|(k, _)| k.family == family) {
                emit_chain(key, chain, &mut out);
            }
            Ok(out)
        })
    }

    fn finish_compaction(
        &self,
        table: &str,
        family: &[u8],
        kind: CompactionKind,
        input: &[StoredCell],
        retained: &[StoredCell],
    ) -> StorageResult<()> {
        self.with_table_mut(table, |t| {
            t.check_family(table, family)?;
            let kept: BTreeSet<&StoredCell> = retained.iter().collect();

            for cell in input.iter().filter(|c| !kept.contains(c)) {
                t.remove(cell);
            }

            // Native major merge: a delete marker from the input purges the put it masks.
            if kind.is_major() {
                for marker in input.iter().filter(|c| c.is_tombstone()) {
                    let masked = input.iter().find(|c| {
                        !c.is_tombstone() && c.key == marker.key && c.version == marker.version
                    });
                    if let Some(put) = masked {
                        t.remove(put);
                    }
                }
            }
            Ok(())
        })
    }
}
