//! Cell coordinates, stored versions and column family metadata.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Column family attribute that marks a family as transaction-managed.
///
/// Only families carrying this attribute with value `"true"` (any case) are
/// filtered by the transactional garbage collector during compaction.
pub const TRANSACTIONAL_FLAG: &str = "SITX_ENABLED";

/// The time-independent coordinate of a cell: row, family and qualifier.
///
/// Many versions may exist at one `CellKey`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    /// Row key.
    pub row: Vec<u8>,
    /// Column family name.
    pub family: Vec<u8>,
    /// Column qualifier.
    pub qualifier: Vec<u8>,
}

impl CellKey {
    /// Creates a new cell key.
    pub fn new(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
        }
    }

    /// Returns the same row and family with a different qualifier.
    #[must_use]
    pub fn with_qualifier(&self, qualifier: impl Into<Vec<u8>>) -> Self {
        Self {
            row: self.row.clone(),
            family: self.family.clone(),
            qualifier: qualifier.into(),
        }
    }
}

impl fmt::Debug for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}",
            String::from_utf8_lossy(&self.row),
            String::from_utf8_lossy(&self.family),
            String::from_utf8_lossy(&self.qualifier)
        )
    }
}

/// What a stored version holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// A value written at this version.
    Put(Vec<u8>),
    /// A non-transactional delete marker masking the put at the same version.
    Delete,
}

/// One version of one cell as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredCell {
    /// Cell coordinate.
    pub key: CellKey,
    /// Version (a start timestamp for transactional data).
    pub version: u64,
    /// Value or delete marker.
    pub kind: CellKind,
}

impl StoredCell {
    /// Creates a put cell.
    pub fn put(key: CellKey, version: u64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            version,
            kind: CellKind::Put(value.into()),
        }
    }

    /// Creates a delete marker.
    pub fn tombstone(key: CellKey, version: u64) -> Self {
        Self {
            key,
            version,
            kind: CellKind::Delete,
        }
    }

    /// Returns true if this is a non-transactional delete marker.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self.kind, CellKind::Delete)
    }

    /// Returns the value for put cells.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        match &self.kind {
            CellKind::Put(value) => Some(value),
            CellKind::Delete => None,
        }
    }
}

// Store order: key ascending, version descending, delete markers before puts.
impl Ord for StoredCell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.version.cmp(&self.version))
            .then_with(|| kind_rank(&self.kind).cmp(&kind_rank(&other.kind)))
            .then_with(|| self.value().cmp(&other.value()))
    }
}

impl PartialOrd for StoredCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn kind_rank(kind: &CellKind) -> u8 {
    match kind {
        CellKind::Delete => 0,
        CellKind::Put(_) => 1,
    }
}

/// Metadata for a column family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyDescriptor {
    name: Vec<u8>,
    attributes: BTreeMap<String, String>,
}

impl FamilyDescriptor {
    /// Creates a descriptor with no attributes.
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a descriptor flagged as transaction-managed.
    pub fn transactional(name: impl Into<Vec<u8>>) -> Self {
        Self::new(name).with_attribute(TRANSACTIONAL_FLAG, "true")
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the family name.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns true if the family is flagged as transaction-managed.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.attribute(TRANSACTIONAL_FLAG)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_order_is_newest_first_with_deletes_leading() {
        let key = CellKey::new("r", "cf", "q");
        let mut cells = vec![
            StoredCell::put(key.clone(), 5, "old"),
            StoredCell::put(key.clone(), 9, "new"),
            StoredCell::tombstone(key.clone(), 9),
        ];
        cells.sort();

        assert!(cells[0].is_tombstone());
        assert_eq!(cells[1].value(), Some(&b"new"[..]));
        assert_eq!(cells[2].version, 5);
    }

    #[test]
    fn keys_sort_by_row_then_qualifier() {
        let a = StoredCell::put(CellKey::new("a", "cf", "z"), 1, "");
        let b = StoredCell::put(CellKey::new("b", "cf", "a"), 9, "");
        assert!(a < b);
    }

    #[test]
    fn transactional_flag_is_case_insensitive() {
        assert!(FamilyDescriptor::transactional("cf").is_transactional());
        assert!(FamilyDescriptor::new("cf")
            .with_attribute(TRANSACTIONAL_FLAG, "TRUE")
            .is_transactional());
        assert!(!FamilyDescriptor::new("cf")
            .with_attribute(TRANSACTIONAL_FLAG, "yes")
            .is_transactional());
        assert!(!FamilyDescriptor::new("cf").is_transactional());
    }

    #[test]
    fn with_qualifier_keeps_row_and_family() {
        let key = CellKey::new("row1", "cf", "q");
        let other = key.with_qualifier("q2");
        assert_eq!(other.row, key.row);
        assert_eq!(other.family, key.family);
        assert_eq!(other.qualifier, b"q2");
    }
}
