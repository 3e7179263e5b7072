use super::*;
use crate::commit_table::{CommitTable, InMemoryCommitTable};
use crate::error::CoreError;
use proptest::prelude::*;
use std::collections::VecDeque;

/// Locator over a fixed map of shadow cells; optionally scripted so that
/// successive shadow reads return different answers.
#[derive(Default)]
struct MapLocator {
    cache: CommitCache,
    shadow: HashMap<Timestamp, Timestamp>,
    scripted: VecDeque<Option<Timestamp>>,
    shadow_reads: usize,
    backfilled: Vec<(Timestamp, Timestamp)>,
}

impl CommitTimestampLocator for MapLocator {
    fn read_from_cache(&self, start_ts: Timestamp) -> Option<Timestamp> {
        self.cache.get(start_ts)
    }

    fn read_from_shadow_cell(&mut self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
        self.shadow_reads += 1;
        if let Some(answer) = self.scripted.pop_front() {
            return Ok(answer);
        }
        Ok(self.shadow.get(&start_ts).copied())
    }

    fn remember(&mut self, start_ts: Timestamp, commit_ts: Timestamp) {
        self.cache.insert(start_ts, commit_ts);
    }

    fn backfill_shadow_cell(&mut self, start_ts: Timestamp, commit_ts: Timestamp) {
        self.backfilled.push((start_ts, commit_ts));
    }
}

fn ts(v: u64) -> Timestamp {
    Timestamp::new(v)
}

#[test]
fn cache_hit_does_no_io() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.close();

    let mut locator = MapLocator::default();
    locator.cache.insert(ts(10), ts(12));

    let resolution = CommitTimestampResolver::new(&client)
        .resolve(ts(10), &mut locator)
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::Committed {
            commit_ts: ts(12),
            location: Location::Cache
        }
    );
    assert_eq!(locator.shadow_reads, 0);
}

#[test]
fn shadow_cell_wins_over_commit_table() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.put(ts(100), ts(105)).unwrap();

    let mut locator = MapLocator::default();
    locator.shadow.insert(ts(100), ts(105));

    let resolution = CommitTimestampResolver::new(&client)
        .resolve(ts(100), &mut locator)
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::Committed {
            commit_ts: ts(105),
            location: Location::ShadowCell
        }
    );
    assert_eq!(locator.cache.get(ts(100)), Some(ts(105)));
}

#[test]
fn commit_table_hit_is_cached_and_backfilled() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.put(ts(100), ts(105)).unwrap();

    let mut locator = MapLocator::default();
    let resolution = CommitTimestampResolver::new(&client)
        .resolve(ts(100), &mut locator)
        .unwrap();

    assert_eq!(resolution.commit_timestamp(), Some(ts(105)));
    assert_eq!(locator.cache.get(ts(100)), Some(ts(105)));
    assert_eq!(locator.backfilled, vec![(ts(100), ts(105))]);
}

#[test]
fn absent_below_watermark_is_aborted() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.update_low_watermark(ts(201)).unwrap();

    let resolution = CommitTimestampResolver::new(&client)
        .resolve(ts(200), &mut MapLocator::default())
        .unwrap();
    assert_eq!(resolution, Resolution::Aborted);
}

#[test]
fn absent_at_or_above_watermark_is_undetermined() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.update_low_watermark(ts(200)).unwrap();

    let resolver = CommitTimestampResolver::new(&client);
    assert_eq!(
        resolver.resolve(ts(200), &mut MapLocator::default()).unwrap(),
        Resolution::Undetermined
    );
    assert_eq!(
        resolver.resolve(ts(300), &mut MapLocator::default()).unwrap(),
        Resolution::Undetermined
    );
}

#[test]
fn commit_table_miss_rechecks_shadow_cell() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.update_low_watermark(ts(500)).unwrap();

    // First shadow read misses, then the committer writes its shadow cell
    // and completes its commit table entry before our second read.
    let mut locator = MapLocator {
        scripted: VecDeque::from([None, Some(ts(110))]),
        ..MapLocator::default()
    };

    let resolution = CommitTimestampResolver::new(&client)
        .resolve(ts(100), &mut locator)
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::Committed {
            commit_ts: ts(110),
            location: Location::ShadowCell
        }
    );
    assert_eq!(locator.shadow_reads, 2);
}

#[test]
fn commit_table_failure_is_io_kind() {
    let table = InMemoryCommitTable::new();
    let client = table.client();
    client.close();

    let result = CommitTimestampResolver::new(&client).resolve(ts(1), &mut MapLocator::default());
    assert!(matches!(result, Err(CoreError::Io(_))));
}

/// Commit table whose reads are interrupted.
#[derive(Default)]
struct InterruptedTable {
    reads: std::sync::atomic::AtomicUsize,
}

impl InterruptedTable {
    fn interrupted(&self) -> CoreError {
        self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        CoreError::interrupted("commit table read")
    }
}

impl CommitTable for InterruptedTable {
    fn read_low_watermark(&self) -> CoreResult<Timestamp> {
        Err(self.interrupted())
    }
    fn get_commit_timestamp(&self, _start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
        Err(self.interrupted())
    }
    fn put(&self, _start_ts: Timestamp, _commit_ts: Timestamp) -> CoreResult<()> {
        Ok(())
    }
    fn complete_transaction(&self, _start_ts: Timestamp) -> CoreResult<()> {
        Ok(())
    }
    fn update_low_watermark(&self, _low_watermark: Timestamp) -> CoreResult<()> {
        Ok(())
    }
}

#[test]
fn interruption_is_surfaced_not_retried() {
    let table = InterruptedTable::default();
    let err = CommitTimestampResolver::new(&table)
        .resolve(ts(1), &mut MapLocator::default())
        .unwrap_err();

    assert!(err.is_interrupted());
    assert_eq!(table.reads.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[derive(Debug, Clone)]
struct ResolverState {
    low_watermark: u64,
    commit_entries: Vec<(u64, u64)>,
    shadow_cells: Vec<(u64, u64)>,
    probe: u64,
}

fn resolver_state() -> impl Strategy<Value = ResolverState> {
    (
        0u64..200,
        prop::collection::vec((1u64..100, 1u64..50), 0..10),
        prop::collection::vec((1u64..100, 1u64..50), 0..10),
        1u64..120,
    )
        .prop_map(|(low_watermark, commits, shadows, probe)| ResolverState {
            low_watermark,
            commit_entries: commits.into_iter().map(|(s, d)| (s, s + d)).collect(),
            shadow_cells: shadows.into_iter().map(|(s, d)| (s, s + d)).collect(),
            probe,
        })
}

proptest! {
    #[test]
    fn committed_verdict_is_backed_by_a_record(state in resolver_state()) {
        // Shadow cells always agree with the commit table when both exist.
        let table = InMemoryCommitTable::new();
        let client = table.client();
        client.update_low_watermark(ts(state.low_watermark)).unwrap();
        let mut shadow = HashMap::new();
        for (s, c) in &state.commit_entries {
            client.put(ts(*s), ts(*c)).unwrap();
        }
        for (s, c) in &state.shadow_cells {
            let c = table.commit_timestamp(ts(*s)).map_or(*c, Timestamp::as_u64);
            shadow.insert(ts(*s), ts(c));
        }

        let mut locator = MapLocator { shadow: shadow.clone(), ..MapLocator::default() };
        let resolution = CommitTimestampResolver::new(&client)
            .resolve(ts(state.probe), &mut locator)
            .unwrap();

        let probe = ts(state.probe);
        match resolution {
            Resolution::Committed { commit_ts, .. } => {
                let from_shadow = shadow.get(&probe).copied();
                let from_table = table.commit_timestamp(probe);
                prop_assert!(from_shadow == Some(commit_ts) || from_table == Some(commit_ts));
                prop_assert!(commit_ts > probe);
            }
            Resolution::Aborted => {
                prop_assert!(probe < ts(state.low_watermark));
                prop_assert!(!shadow.contains_key(&probe));
                prop_assert!(table.commit_timestamp(probe).is_none());
            }
            Resolution::Undetermined => {
                prop_assert!(probe >= ts(state.low_watermark));
            }
        }
    }

    #[test]
    fn resolution_is_deterministic(state in resolver_state()) {
        let table = InMemoryCommitTable::new();
        let client = table.client();
        client.update_low_watermark(ts(state.low_watermark)).unwrap();
        for (s, c) in &state.commit_entries {
            client.put(ts(*s), ts(*c)).unwrap();
        }

        let resolver = CommitTimestampResolver::new(&client);
        let first = resolver.resolve(ts(state.probe), &mut MapLocator::default()).unwrap();
        let second = resolver.resolve(ts(state.probe), &mut MapLocator::default()).unwrap();
        prop_assert_eq!(first, second);
    }
}
