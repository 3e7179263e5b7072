//! Cross-crate integration test helpers.
//!
//! [`WorkloadHarness`] replays generated transactions against a
//! [`TestCluster`] while tracking which values a later snapshot must see.

use crate::fixtures::{TestCluster, FAMILY};
use crate::generators::{Outcome, PlannedTransaction};
use sitx_core::{KvCellId, Timestamp, Transaction};
use std::collections::BTreeMap;

/// What one snapshot reads for every touched (row, qualifier).
pub type SnapshotReads = BTreeMap<(String, String), Option<Vec<u8>>>;

/// Replays transactions and checks snapshot reads against a model.
pub struct WorkloadHarness {
    /// The cluster under test.
    pub cluster: TestCluster,
    /// Committed value with the highest start timestamp per (row, qualifier).
    committed: BTreeMap<(String, String), (Timestamp, Vec<u8>)>,
    /// Every (row, qualifier) ever written, whatever the outcome.
    touched: BTreeMap<(String, String), ()>,
}

impl WorkloadHarness {
    /// Creates a harness over `cluster`.
    pub fn new(cluster: TestCluster) -> Self {
        Self {
            cluster,
            committed: BTreeMap::new(),
            touched: BTreeMap::new(),
        }
    }

    /// Runs one transaction to its planned outcome.
    ///
    /// Returns the commit timestamp for committed transactions.
    pub fn apply(&mut self, plan: &PlannedTransaction) -> Option<Timestamp> {
        let mut tx = self.cluster.manager.begin().expect("begin");
        self.write(&mut tx, plan);
        self.finish(&mut tx, plan)
    }

    /// Starts every transaction of `plans` and performs all their writes
    /// before finishing them in reverse order, so later starters commit
    /// first.
    pub fn apply_interleaved(&mut self, plans: &[PlannedTransaction]) -> Vec<Option<Timestamp>> {
        let mut txs: Vec<_> = plans
            .iter()
            .map(|_| self.cluster.manager.begin().expect("begin"))
            .collect();
        for (tx, plan) in txs.iter_mut().zip(plans) {
            self.write(tx, plan);
        }
        let mut outcomes: Vec<_> = txs
            .iter_mut()
            .zip(plans)
            .rev()
            .map(|(tx, plan)| self.finish(tx, plan))
            .collect();
        outcomes.reverse();
        outcomes
    }

    fn write(&mut self, tx: &mut Transaction<KvCellId>, plan: &PlannedTransaction) {
        let table = self.cluster.table();
        for write in &plan.writes {
            table
                .put(
                    tx,
                    write.row.as_bytes(),
                    FAMILY,
                    write.qualifier.as_bytes(),
                    write.value.clone(),
                )
                .expect("transactional put");
            self.touched
                .insert((write.row.clone(), write.qualifier.clone()), ());
        }
    }

    fn finish(
        &mut self,
        tx: &mut Transaction<KvCellId>,
        plan: &PlannedTransaction,
    ) -> Option<Timestamp> {
        let manager = &self.cluster.manager;
        match plan.outcome {
            Outcome::Commit => {
                let commit_ts = manager.commit(tx).expect("commit");
                let start_ts = tx.start_timestamp();
                for write in &plan.writes {
                    let slot = self
                        .committed
                        .entry((write.row.clone(), write.qualifier.clone()))
                        .or_insert((start_ts, write.value.clone()));
                    if slot.0 <= start_ts {
                        *slot = (start_ts, write.value.clone());
                    }
                }
                Some(commit_ts)
            }
            Outcome::Rollback => {
                manager.rollback(tx).expect("rollback");
                None
            }
            Outcome::Abandon => None,
        }
    }

    /// Reads every touched cell at `reader`'s snapshot.
    pub fn read_all(&self, reader: &Transaction<KvCellId>) -> SnapshotReads {
        let table = self.cluster.table();
        self.touched
            .keys()
            .map(|(row, qualifier)| {
                let value = table
                    .get(reader, row.as_bytes(), FAMILY, qualifier.as_bytes())
                    .expect("snapshot read");
                ((row.clone(), qualifier.clone()), value)
            })
            .collect()
    }

    /// Checks that a fresh snapshot sees exactly the committed values.
    pub fn verify_all(&self) {
        let reader = self.cluster.manager.begin().expect("begin reader");
        for ((row, qualifier), actual) in self.read_all(&reader) {
            let expected = self
                .committed
                .get(&(row.clone(), qualifier.clone()))
                .map(|(_, value)| value);
            assert_eq!(
                actual.as_ref(),
                expected,
                "snapshot mismatch for {row}/{qualifier}"
            );
        }
    }

    /// Returns the number of cells holding a committed value.
    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }
}
