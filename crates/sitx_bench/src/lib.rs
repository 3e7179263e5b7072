//! Benchmark utilities.

use sitx_core::{InMemoryCommitTable, Timestamp};
use sitx_storage::LogBackend;
use sitx_tso::{PipelineConfig, TsoServer, WalEvent};
use std::sync::Arc;

/// Generates a deterministic mix of events: every transaction is granted a
/// timestamp and three out of four commit.
pub fn generate_events(count: usize) -> Vec<WalEvent> {
    let mut events = Vec::with_capacity(count);
    let mut ts = 1u64;
    while events.len() < count {
        let start_ts = Timestamp::new(ts);
        events.push(WalEvent::Timestamp { start_ts });
        if ts % 4 == 0 {
            events.push(WalEvent::Abort { start_ts });
        } else {
            events.push(WalEvent::Commit {
                start_ts,
                commit_ts: Timestamp::new(ts + 1),
            });
        }
        ts += 2;
    }
    events.truncate(count);
    events
}

/// Opens an oracle over `log` with its own commit table.
pub fn open_oracle(
    log: Box<dyn LogBackend>,
    config: PipelineConfig,
) -> (Arc<TsoServer>, InMemoryCommitTable) {
    let table = InMemoryCommitTable::new();
    let server = TsoServer::open(log, Box::new(table.client()), config)
        .unwrap_or_else(|e| panic!("failed to open oracle: {e}"));
    (Arc::new(server), table)
}
