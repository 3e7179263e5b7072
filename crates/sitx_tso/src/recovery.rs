//! Rebuilding oracle state from the write-ahead log.

use crate::error::TsoResult;
use crate::event::WalEvent;
use crate::wal::WalReader;
use sitx_core::Timestamp;
use sitx_storage::LogBackend;
use tracing::{info, warn};

/// What the log says about the oracle's past.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredState {
    /// Highest timestamp mentioned by any event, reservations included.
    pub max_timestamp: Timestamp,
    /// Highest low watermark logged.
    pub low_watermark: Timestamp,
    /// Every logged commit decision, in log order.
    pub commits: Vec<(Timestamp, Timestamp)>,
    /// Intact batches read.
    pub batches: u64,
    /// Events read.
    pub events: u64,
    /// End of the last intact batch.
    pub valid_len: u64,
    /// Size of the log when recovery ran.
    pub log_len: u64,
}

impl RecoveredState {
    /// Returns the first timestamp the oracle may hand out.
    #[must_use]
    pub fn next_timestamp(&self) -> Timestamp {
        self.max_timestamp.next()
    }

    /// Returns true if an incomplete batch follows the intact ones.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.log_len
    }

    fn apply(&mut self, event: &WalEvent) {
        self.events += 1;
        self.max_timestamp = self.max_timestamp.max(event.max_timestamp());
        match *event {
            WalEvent::Commit { start_ts, commit_ts } => self.commits.push((start_ts, commit_ts)),
            WalEvent::LowWatermark { low_watermark } => {
                self.low_watermark = self.low_watermark.max(low_watermark);
            }
            WalEvent::Timestamp { .. } | WalEvent::Abort { .. } | WalEvent::Reserve { .. } => {}
        }
    }
}

/// Replays the whole log.
///
/// # Errors
///
/// Returns an error if the log cannot be read or holds a corrupted batch.
/// A torn final batch is not an error; it is reported through
/// [`RecoveredState::has_torn_tail`].
pub fn recover(log: &dyn LogBackend) -> TsoResult<RecoveredState> {
    let mut state = RecoveredState::default();
    let mut reader = WalReader::new(log)?;

    for batch in &mut reader {
        let batch = batch?;
        state.batches += 1;
        for event in &batch.events {
            state.apply(event);
        }
    }

    state.valid_len = reader.valid_len();
    state.log_len = reader.log_len();

    if state.has_torn_tail() {
        warn!(
            valid_len = state.valid_len,
            log_len = state.log_len,
            "WAL ends in an incomplete batch"
        );
    }
    info!(
        batches = state.batches,
        events = state.events,
        max_timestamp = %state.max_timestamp,
        low_watermark = %state.low_watermark,
        "WAL replayed"
    );

    Ok(state)
}
