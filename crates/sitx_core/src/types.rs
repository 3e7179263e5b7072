//! Core type definitions for sitx.

use std::fmt;

/// A timestamp issued by the timestamp oracle.
///
/// Start timestamps are unique and strictly increasing over the lifetime of
/// the system. A commit timestamp always exceeds its start timestamp. Both
/// come from the same sequence, so they are directly comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The smallest timestamp; no transaction ever starts at zero.
    pub const ZERO: Self = Self(0);

    /// Creates a new timestamp.
    #[must_use]
    pub const fn new(ts: u64) -> Self {
        Self(ts)
    }

    /// Returns the raw timestamp value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next timestamp.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(ts: u64) -> Self {
        Self(ts)
    }
}

/// Outcome of asking the timestamp oracle to commit a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The decision is durable; the transaction committed at this timestamp.
    Committed(Timestamp),
    /// The decision is durable; the transaction is aborted.
    Aborted,
}
