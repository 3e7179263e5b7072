//! Shadow cells.
//!
//! A shadow cell is a redundant copy of a transaction's commit timestamp
//! stored next to each cell it wrote, at `qualifier + SHADOW_CELL_SUFFIX`
//! with version = start timestamp and value = commit timestamp (8 bytes,
//! big-endian). Readers that find one skip the commit table entirely.
//!
//! Shadow cells are a cache, never authoritative over the commit table.
//! Writing one is best-effort and idempotent: the value is a pure function
//! of `(start_ts, commit_ts)`, so repeated or concurrent writes converge.

use crate::backend::{CellId, TransactionalBackend};
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use std::collections::HashSet;
use tracing::warn;

/// Suffix appended to a qualifier to form its shadow cell qualifier.
pub const SHADOW_CELL_SUFFIX: &[u8] = b":SITX_CTS";

/// Returns `qualifier` with the shadow cell suffix appended.
#[must_use]
pub fn add_shadow_cell_suffix(qualifier: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(qualifier.len() + SHADOW_CELL_SUFFIX.len());
    out.extend_from_slice(qualifier);
    out.extend_from_slice(SHADOW_CELL_SUFFIX);
    out
}

/// Returns true if `qualifier` names a shadow cell.
#[must_use]
pub fn is_shadow_cell(qualifier: &[u8]) -> bool {
    qualifier.ends_with(SHADOW_CELL_SUFFIX)
}

/// Returns the data qualifier a shadow cell qualifier belongs to.
#[must_use]
pub fn strip_shadow_cell_suffix(qualifier: &[u8]) -> Option<&[u8]> {
    qualifier.strip_suffix(SHADOW_CELL_SUFFIX)
}

/// Encodes a commit timestamp as a shadow cell value.
#[must_use]
pub fn encode_commit_timestamp(commit_ts: Timestamp) -> [u8; 8] {
    commit_ts.as_u64().to_be_bytes()
}

/// Decodes a shadow cell value.
///
/// # Errors
///
/// Returns [`CoreError::CorruptedCommitTimestamp`] unless the value is
/// exactly eight bytes.
pub fn decode_commit_timestamp(value: &[u8]) -> CoreResult<Timestamp> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| {
        CoreError::corrupted_commit_timestamp(format!(
            "shadow cell value has {} bytes, expected 8",
            value.len()
        ))
    })?;
    Ok(Timestamp::new(u64::from_be_bytes(bytes)))
}

/// Reads the shadow cell of `cell` at version `start_ts`.
pub fn read_shadow_cell<B>(
    backend: &B,
    cell: &B::Cell,
    start_ts: Timestamp,
) -> CoreResult<Option<Timestamp>>
where
    B: TransactionalBackend + ?Sized,
{
    let shadow = backend.shadow_cell(cell);
    match backend.read(&shadow, start_ts)? {
        Some(value) => decode_commit_timestamp(&value).map(Some),
        None => Ok(None),
    }
}

/// Writes the shadow cell of `cell` for a committed transaction.
pub fn write_shadow_cell<B>(
    backend: &B,
    cell: &B::Cell,
    start_ts: Timestamp,
    commit_ts: Timestamp,
) -> CoreResult<()>
where
    B: TransactionalBackend + ?Sized,
{
    let shadow = backend.shadow_cell(cell);
    backend.write(&shadow, start_ts, encode_commit_timestamp(commit_ts).to_vec())?;
    Ok(())
}

/// Writes shadow cells for a whole write set and flushes their targets.
///
/// Failures are logged and skipped. Returns true only if every shadow cell
/// was written and every touched target flushed.
pub fn write_shadow_cells<'a, B, I>(
    backend: &B,
    cells: I,
    start_ts: Timestamp,
    commit_ts: Timestamp,
) -> bool
where
    B: TransactionalBackend + ?Sized,
    B::Cell: 'a,
    I: IntoIterator<Item = &'a B::Cell>,
{
    let mut complete = true;
    let mut targets = HashSet::new();

    for cell in cells {
        match write_shadow_cell(backend, cell, start_ts, commit_ts) {
            Ok(()) => {
                targets.insert(backend.shadow_cell(cell).target());
            }
            Err(e) => {
                complete = false;
                warn!(?cell, %start_ts, error = %e, "failed inserting shadow cell");
            }
        }
    }

    for target in &targets {
        if let Err(e) = backend.flush(target) {
            complete = false;
            warn!(?target, %start_ts, error = %e, "failed flushing shadow cells");
        }
    }

    complete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KvBackend, KvCellId};
    use sitx_storage::{CellKey, FamilyDescriptor, InMemoryStore};
    use std::sync::Arc;

    fn backend() -> KvBackend {
        let store = Arc::new(InMemoryStore::new());
        store.create_table("t", vec![FamilyDescriptor::transactional("cf")]);
        KvBackend::new(store)
    }

    #[test]
    fn suffix_helpers() {
        let shadow = add_shadow_cell_suffix(b"q");
        assert_eq!(shadow, b"q:SITX_CTS".to_vec());
        assert!(is_shadow_cell(&shadow));
        assert!(!is_shadow_cell(b"q"));
        assert_eq!(strip_shadow_cell_suffix(&shadow), Some(&b"q"[..]));
    }

    #[test]
    fn value_is_big_endian() {
        assert_eq!(
            encode_commit_timestamp(Timestamp::new(105)),
            [0, 0, 0, 0, 0, 0, 0, 105]
        );
        assert_eq!(
            decode_commit_timestamp(&[0, 0, 0, 0, 0, 0, 1, 0]).unwrap(),
            Timestamp::new(256)
        );
    }

    #[test]
    fn short_value_is_corrupt() {
        assert!(matches!(
            decode_commit_timestamp(&[1, 2, 3]),
            Err(CoreError::CorruptedCommitTimestamp { .. })
        ));
    }

    #[test]
    fn write_then_read() {
        let backend = backend();
        let cell = KvCellId::new("t", CellKey::new("row1", "cf", "q"));

        assert_eq!(read_shadow_cell(&backend, &cell, Timestamp::new(100)).unwrap(), None);

        write_shadow_cell(&backend, &cell, Timestamp::new(100), Timestamp::new(105)).unwrap();
        assert_eq!(
            read_shadow_cell(&backend, &cell, Timestamp::new(100)).unwrap(),
            Some(Timestamp::new(105))
        );
        // Exact version only.
        assert_eq!(read_shadow_cell(&backend, &cell, Timestamp::new(101)).unwrap(), None);
    }

    #[test]
    fn repeated_writes_are_idempotent() {
        let backend = backend();
        let cell = KvCellId::new("t", CellKey::new("row1", "cf", "q"));

        for _ in 0..2 {
            assert!(write_shadow_cells(
                &backend,
                [&cell],
                Timestamp::new(100),
                Timestamp::new(105)
            ));
        }
        assert_eq!(
            read_shadow_cell(&backend, &cell, Timestamp::new(100)).unwrap(),
            Some(Timestamp::new(105))
        );
    }

    #[test]
    fn missing_family_is_reported_not_raised() {
        let backend = backend();
        let cell = KvCellId::new("t", CellKey::new("row1", "nope", "q"));
        assert!(!write_shadow_cells(
            &backend,
            [&cell],
            Timestamp::new(1),
            Timestamp::new(2)
        ));
    }
}
