//! Property-based test generators using proptest.
//!
//! Provides strategies for log events and for transaction workloads that a
//! test can replay against a [`crate::TestCluster`] and a simple model.

use proptest::prelude::*;
use sitx_core::Timestamp;
use sitx_tso::WalEvent;

/// Strategy for timestamps in a range tests can reason about.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (1u64..1_000_000).prop_map(Timestamp::new)
}

/// Strategy for a single logged event.
///
/// Commit events always carry a commit timestamp above their start
/// timestamp, as the oracle would write them.
pub fn wal_event_strategy() -> impl Strategy<Value = WalEvent> {
    prop_oneof![
        4 => timestamp_strategy().prop_map(|start_ts| WalEvent::Timestamp { start_ts }),
        3 => (timestamp_strategy(), 1u64..1000).prop_map(|(start_ts, gap)| WalEvent::Commit {
            start_ts,
            commit_ts: Timestamp::new(start_ts.as_u64() + gap),
        }),
        1 => timestamp_strategy().prop_map(|start_ts| WalEvent::Abort { start_ts }),
        1 => timestamp_strategy().prop_map(|low_watermark| WalEvent::LowWatermark { low_watermark }),
        1 => timestamp_strategy().prop_map(|upper_bound| WalEvent::Reserve { upper_bound }),
    ]
}

/// Strategy for the events of one batch.
pub fn wal_batch_strategy(max_events: usize) -> impl Strategy<Value = Vec<WalEvent>> {
    prop::collection::vec(wal_event_strategy(), 1..=max_events.max(1))
}

/// How a generated transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Commit through the oracle.
    Commit,
    /// Roll back through the oracle.
    Rollback,
    /// Never finish; the writer is presumed crashed.
    Abandon,
}

/// One write of a generated transaction.
#[derive(Debug, Clone)]
pub struct PlannedWrite {
    /// Row key.
    pub row: String,
    /// Column qualifier.
    pub qualifier: String,
    /// Non-empty value.
    pub value: Vec<u8>,
}

/// A transaction to replay.
#[derive(Debug, Clone)]
pub struct PlannedTransaction {
    /// Writes in order.
    pub writes: Vec<PlannedWrite>,
    /// How the transaction ends.
    pub outcome: Outcome,
}

/// Strategy for row keys drawn from a small space so writes collide.
pub fn row_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("row{n}"))
}

/// Strategy for qualifiers drawn from a small space.
pub fn qualifier_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_owned)
}

/// Strategy for values; never empty, since empty values mark deletes.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..32)
}

/// Strategy for an outcome, weighted towards commits.
pub fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        6 => Just(Outcome::Commit),
        2 => Just(Outcome::Rollback),
        1 => Just(Outcome::Abandon),
    ]
}

/// Strategy for one transaction.
pub fn transaction_strategy() -> impl Strategy<Value = PlannedTransaction> {
    (
        prop::collection::vec(
            (row_strategy(), qualifier_strategy(), value_strategy()).prop_map(
                |(row, qualifier, value)| PlannedWrite {
                    row,
                    qualifier,
                    value,
                },
            ),
            1..5,
        ),
        outcome_strategy(),
    )
        .prop_map(|(writes, outcome)| PlannedTransaction { writes, outcome })
}

/// Strategy for a sequence of transactions run one after another.
pub fn workload_strategy(
    min_txs: usize,
    max_txs: usize,
) -> impl Strategy<Value = Vec<PlannedTransaction>> {
    prop::collection::vec(transaction_strategy(), min_txs..max_txs)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    ///
    /// Cluster-backed properties start an oracle thread per case, so they
    /// use this.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitx_tso::{decode_events, encode_events};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn commit_events_are_ordered(event in wal_event_strategy()) {
            if let WalEvent::Commit { start_ts, commit_ts } = event {
                prop_assert!(commit_ts > start_ts);
            }
        }

        #[test]
        fn batches_decode(events in wal_batch_strategy(16)) {
            let payload = encode_events(&events);
            prop_assert_eq!(decode_events(0, &payload).unwrap(), events);
        }

        #[test]
        fn planned_values_are_never_empty(tx in transaction_strategy()) {
            prop_assert!(!tx.writes.is_empty());
            prop_assert!(tx.writes.iter().all(|w| !w.value.is_empty()));
        }
    }
}
