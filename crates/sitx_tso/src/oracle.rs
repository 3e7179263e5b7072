//! Timestamp sequence and low watermark.

use sitx_core::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of unique, strictly increasing timestamps.
///
/// Start and commit timestamps come from the same sequence. The low
/// watermark only ever moves forward.
#[derive(Debug)]
pub struct TimestampOracle {
    last: AtomicU64,
    low_watermark: AtomicU64,
}

impl TimestampOracle {
    /// Creates an oracle whose next timestamp is `last + 1`.
    #[must_use]
    pub fn new(last: Timestamp, low_watermark: Timestamp) -> Self {
        Self {
            last: AtomicU64::new(last.as_u64()),
            low_watermark: AtomicU64::new(low_watermark.as_u64()),
        }
    }

    /// Hands out the next timestamp.
    pub fn next_timestamp(&self) -> Timestamp {
        Timestamp::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns the most recently issued timestamp.
    #[must_use]
    pub fn last_timestamp(&self) -> Timestamp {
        Timestamp::new(self.last.load(Ordering::SeqCst))
    }

    /// Returns the current low watermark.
    #[must_use]
    pub fn low_watermark(&self) -> Timestamp {
        Timestamp::new(self.low_watermark.load(Ordering::SeqCst))
    }

    /// Raises the low watermark to `ts` unless it is already higher.
    ///
    /// Returns true if the watermark moved.
    pub fn advance_low_watermark(&self, ts: Timestamp) -> bool {
        self.low_watermark.fetch_max(ts.as_u64(), Ordering::SeqCst) < ts.as_u64()
    }
}

impl Default for TimestampOracle {
    fn default() -> Self {
        Self::new(Timestamp::ZERO, Timestamp::ZERO)
    }
}
