//! Client interface to the timestamp oracle.

use crate::error::CoreResult;
use crate::types::{CommitOutcome, Timestamp};

/// A connection to the timestamp oracle.
///
/// Every reply is released only after the decision it carries is durable on
/// the oracle's write-ahead log. When a call fails with an I/O-kind error the
/// outcome is unknown: the decision may or may not have been persisted, and
/// the caller must re-derive it later through the commit table.
pub trait TsoClient: Send + Sync {
    /// Obtains a fresh, globally unique start timestamp.
    fn start_timestamp(&self) -> CoreResult<Timestamp>;

    /// Asks the oracle to commit the transaction that started at `start_ts`.
    fn commit(&self, start_ts: Timestamp) -> CoreResult<CommitOutcome>;

    /// Tells the oracle the transaction that started at `start_ts` aborted.
    fn abort(&self, start_ts: Timestamp) -> CoreResult<()>;
}
