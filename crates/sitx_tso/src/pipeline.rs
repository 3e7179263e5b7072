//! The durability pipeline.
//!
//! Request handlers enqueue events on a bounded channel; one consumer
//! thread drains it in arrival order, encodes events into a batch buffer
//! and flushes the batch when no further event is immediately ready or the
//! buffer grows past the configured size. A flush:
//!
//! 1. appends the whole batch to the log as one framed record and makes it
//!    durable,
//! 2. applies the batch's commits and low watermark advances to the commit
//!    table,
//! 3. only then hands every deferred reply of the batch to its connection.
//!
//! If either of the first two steps fails, no reply of the batch is sent.
//! Commit table updates of a batch that reached the log are kept and
//! retried in log order before anything logged later is applied, so the
//! table never holds a low watermark past a logged commit it lacks.
//!
//! Start timestamps granted without logging are covered by a reservation:
//! before releasing a grant above the durable reservation, the consumer
//! logs a new upper bound in the same batch. Recovery resumes above it.

use crate::config::{Backpressure, PipelineConfig};
use crate::connection::{Connection, Reply};
use crate::error::{TsoError, TsoResult};
use crate::event::WalEvent;
use crate::wal::WalWriter;
use bytes::BytesMut;
use crossbeam::channel::{self, Receiver, Sender, TrySendError, TryRecvError};
use parking_lot::Mutex;
use sitx_core::{CommitTable, Timestamp};
use sitx_storage::StorageError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// One event on its way to the log, with the reply it releases.
#[derive(Debug)]
pub struct PipelineEntry {
    event: WalEvent,
    logged: bool,
    reply: Option<(Connection, Reply)>,
}

impl PipelineEntry {
    /// An event that is logged and replied to.
    #[must_use]
    pub fn logged(event: WalEvent, connection: Connection, reply: Reply) -> Self {
        Self {
            event,
            logged: true,
            reply: Some((connection, reply)),
        }
    }

    /// An event that is logged with nobody waiting for it.
    #[must_use]
    pub fn silent(event: WalEvent) -> Self {
        Self {
            event,
            logged: true,
            reply: None,
        }
    }

    /// An event that skips the log. Its reply still waits for the batch it
    /// was queued in, which keeps replies in request order.
    #[must_use]
    pub fn unlogged(event: WalEvent, connection: Connection, reply: Reply) -> Self {
        Self {
            event,
            logged: false,
            reply: Some((connection, reply)),
        }
    }

    /// Returns the event.
    #[must_use]
    pub fn event(&self) -> &WalEvent {
        &self.event
    }
}

enum Command {
    Append(PipelineEntry),
    Shutdown,
}

/// Counters describing pipeline activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Batches made durable.
    pub batches: u64,
    /// Events in durable batches.
    pub events: u64,
    /// Framed payload bytes in durable batches.
    pub bytes: u64,
    /// Replies handed to live connections.
    pub replies: u64,
    /// Replies dropped because their connection was gone.
    pub discarded_replies: u64,
    /// Batches lost to durability faults.
    pub faults: u64,
}

#[derive(Debug, Default)]
struct Shared {
    batches: AtomicU64,
    events: AtomicU64,
    bytes: AtomicU64,
    replies: AtomicU64,
    discarded_replies: AtomicU64,
    faults: AtomicU64,
    last_fault: Mutex<Option<String>>,
}

impl Shared {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            batches: self.batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            discarded_replies: self.discarded_replies.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running durability pipeline.
///
/// Dropping the handle shuts the pipeline down after it has flushed every
/// event already queued.
pub struct DurabilityPipeline {
    sender: Sender<Command>,
    backpressure: Backpressure,
    capacity: usize,
    shared: Arc<Shared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl DurabilityPipeline {
    /// Starts the consumer thread.
    ///
    /// `last_logged` is the highest timestamp the log already accounts
    /// for; unlogged grants above it trigger a reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(
        writer: WalWriter,
        commit_table: Box<dyn CommitTable>,
        config: &PipelineConfig,
        last_logged: Timestamp,
    ) -> TsoResult<Self> {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = channel::bounded(capacity);
        let shared = Arc::new(Shared::default());

        let consumer = Consumer {
            receiver,
            writer,
            commit_table,
            batch_size: config.batch_size,
            buffer: BytesMut::with_capacity(config.batch_size),
            batch_events: 0,
            applies: Vec::new(),
            unapplied: VecDeque::new(),
            reservation: config.timestamp_reservation,
            reserved: last_logged,
            pending_reserved: last_logged,
            replies: Vec::new(),
            batch_seq: 0,
            shared: Arc::clone(&shared),
        };
        let handle = std::thread::Builder::new()
            .name("sitx-persist".to_string())
            .spawn(move || consumer.run())
            .map_err(StorageError::from)?;

        info!(
            batch_size = config.batch_size,
            queue_capacity = capacity,
            backpressure = ?config.backpressure,
            "durability pipeline started"
        );

        Ok(Self {
            sender,
            backpressure: config.backpressure,
            capacity,
            shared,
            consumer: Mutex::new(Some(handle)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Enqueues an entry for the consumer.
    ///
    /// This is the only place a producer can block, and only under
    /// [`Backpressure::Block`] with a full queue.
    ///
    /// # Errors
    ///
    /// - [`TsoError::Backpressure`] if the queue is full under
    ///   [`Backpressure::Reject`]
    /// - [`TsoError::Shutdown`] if the pipeline has stopped
    pub fn append(&self, entry: PipelineEntry) -> TsoResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TsoError::Shutdown);
        }
        let command = Command::Append(entry);
        match self.backpressure {
            Backpressure::Block => self.sender.send(command).map_err(|_| TsoError::Shutdown),
            Backpressure::Reject => match self.sender.try_send(command) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(TsoError::Backpressure {
                    capacity: self.capacity,
                }),
                Err(TrySendError::Disconnected(_)) => Err(TsoError::Shutdown),
            },
        }
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.shared.snapshot()
    }

    /// Returns a description of the most recent durability fault.
    #[must_use]
    pub fn last_fault(&self) -> Option<String> {
        self.shared.last_fault.lock().clone()
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Flushes everything queued so far and stops the consumer.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        // Fails only if the consumer already exited.
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.consumer.lock().take() {
            if handle.join().is_err() {
                error!("durability pipeline consumer panicked");
            }
        }
        info!(stats = ?self.stats(), "durability pipeline stopped");
    }
}

impl Drop for DurabilityPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Consumer {
    receiver: Receiver<Command>,
    writer: WalWriter,
    commit_table: Box<dyn CommitTable>,
    batch_size: usize,
    buffer: BytesMut,
    batch_events: u64,
    /// Logged events the commit table must see before replies go out.
    applies: Vec<WalEvent>,
    /// Logged updates the commit table has not taken yet, in log order.
    unapplied: VecDeque<WalEvent>,
    reservation: u64,
    /// Highest durably reserved timestamp.
    reserved: Timestamp,
    /// Reservation including the batch being built.
    pending_reserved: Timestamp,
    replies: Vec<(Connection, Reply)>,
    batch_seq: u64,
    shared: Arc<Shared>,
}

impl Consumer {
    fn run(mut self) {
        'outer: while let Ok(command) = self.receiver.recv() {
            if !self.handle(command) {
                break;
            }
            loop {
                match self.receiver.try_recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => {
                        self.flush();
                        break;
                    }
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }
        }

        // Producers that raced the shutdown still get their batch.
        while let Ok(command) = self.receiver.try_recv() {
            if let Command::Append(entry) = command {
                self.push(entry);
            }
        }
        self.flush();

        if !self.unapplied.is_empty() {
            error!(
                unapplied = self.unapplied.len(),
                "stopping with logged commit table updates unapplied, recovery replays them"
            );
        }
    }

    /// Returns false on shutdown.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Append(entry) => {
                self.push(entry);
                true
            }
            Command::Shutdown => false,
        }
    }

    fn push(&mut self, entry: PipelineEntry) {
        if let (false, WalEvent::Timestamp { start_ts }) = (entry.logged, entry.event) {
            if start_ts > self.pending_reserved {
                self.reserve(start_ts);
            }
        }
        if entry.logged {
            entry.event.encode(&mut self.buffer);
            self.batch_events += 1;
            if matches!(
                entry.event,
                WalEvent::Commit { .. } | WalEvent::LowWatermark { .. }
            ) {
                self.applies.push(entry.event);
            }
        }
        if let Some(reply) = entry.reply {
            self.replies.push(reply);
        }
        if self.buffer.len() > self.batch_size {
            self.flush();
        }
    }

    fn reserve(&mut self, start_ts: Timestamp) {
        let upper_bound = Timestamp::new(start_ts.as_u64().saturating_add(self.reservation));
        WalEvent::Reserve { upper_bound }.encode(&mut self.buffer);
        self.batch_events += 1;
        self.pending_reserved = upper_bound;
        debug!(%upper_bound, "reserving timestamps");
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() && self.replies.is_empty() {
            return;
        }
        self.batch_seq += 1;

        match self.persist() {
            Ok(()) => {
                self.reserved = self.pending_reserved;
                let (mut delivered, mut discarded) = (0u64, 0u64);
                for (connection, reply) in self.replies.drain(..) {
                    if connection.deliver(reply) {
                        delivered += 1;
                    } else {
                        discarded += 1;
                    }
                }
                if !self.buffer.is_empty() {
                    self.shared.batches.fetch_add(1, Ordering::Relaxed);
                    self.shared.events.fetch_add(self.batch_events, Ordering::Relaxed);
                    self.shared
                        .bytes
                        .fetch_add(self.buffer.len() as u64, Ordering::Relaxed);
                }
                self.shared.replies.fetch_add(delivered, Ordering::Relaxed);
                self.shared
                    .discarded_replies
                    .fetch_add(discarded, Ordering::Relaxed);
                debug!(
                    batch = self.batch_seq,
                    events = self.batch_events,
                    bytes = self.buffer.len(),
                    replies = delivered,
                    "batch flushed"
                );
            }
            Err(e) => {
                let fault = TsoError::Durability {
                    batch: self.batch_seq,
                    message: e.to_string(),
                };
                error!(
                    batch = self.batch_seq,
                    events = self.batch_events,
                    withheld_replies = self.replies.len(),
                    unapplied = self.unapplied.len(),
                    error = %e,
                    "durability fault, batch replies withheld"
                );
                self.shared.faults.fetch_add(1, Ordering::Relaxed);
                *self.shared.last_fault.lock() = Some(fault.to_string());
                self.replies.clear();
                self.pending_reserved = self.reserved;
            }
        }

        self.buffer.clear();
        self.applies.clear();
        self.batch_events = 0;
    }

    fn persist(&mut self) -> TsoResult<()> {
        if !self.buffer.is_empty() {
            self.writer.append_batch(&self.buffer)?;
            self.unapplied.extend(self.applies.drain(..));
        }
        while let Some(&event) = self.unapplied.front() {
            match event {
                WalEvent::Commit { start_ts, commit_ts } => {
                    self.commit_table.put(start_ts, commit_ts)?;
                }
                WalEvent::LowWatermark { low_watermark } => {
                    self.commit_table.update_low_watermark(low_watermark)?;
                }
                WalEvent::Timestamp { .. } | WalEvent::Abort { .. } | WalEvent::Reserve { .. } => {}
            }
            self.unapplied.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Response;
    use crate::wal::WalReader;
    use sitx_core::{CoreError, CoreResult, InMemoryCommitTable, InMemoryCommitTableClient};
    use sitx_storage::{InMemoryLog, LogBackend, StorageResult};
    use std::time::{Duration, Instant};

    fn start(log: InMemoryLog, table: &InMemoryCommitTable, config: &PipelineConfig) -> DurabilityPipeline {
        let writer = WalWriter::new(Box::new(log), true).unwrap();
        DurabilityPipeline::start(writer, Box::new(table.client()), config, Timestamp::ZERO).unwrap()
    }

    fn commit_entry(conn: &Connection, id: u64, start: u64, commit: u64) -> PipelineEntry {
        let (start_ts, commit_ts) = (Timestamp::new(start), Timestamp::new(commit));
        PipelineEntry::logged(
            WalEvent::Commit { start_ts, commit_ts },
            conn.clone(),
            Reply {
                request_id: id,
                response: Response::Committed { start_ts, commit_ts },
            },
        )
    }

    #[test]
    fn reply_follows_durable_append_and_commit_table() {
        let log = InMemoryLog::new();
        let table = InMemoryCommitTable::new();
        let pipeline = start(log.clone(), &table, &PipelineConfig::default());
        let (conn, replies) = Connection::open(1);

        pipeline.append(commit_entry(&conn, 0, 100, 105)).unwrap();
        let reply = replies.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(reply.request_id, 0);
        assert!(log.durable_len() > 0);
        assert_eq!(table.commit_timestamp(Timestamp::new(100)), Some(Timestamp::new(105)));
    }

    #[test]
    fn per_connection_order_is_preserved() {
        let table = InMemoryCommitTable::new();
        let pipeline = start(InMemoryLog::new(), &table, &PipelineConfig::new().batch_size(40));
        let (conn, replies) = Connection::open(1);

        for i in 0..200u64 {
            pipeline.append(commit_entry(&conn, i, i * 2 + 1, i * 2 + 2)).unwrap();
        }
        pipeline.shutdown();

        let ids: Vec<_> = replies.try_iter().map(|r| r.request_id).collect();
        assert_eq!(ids, (0..200).collect::<Vec<_>>());
        assert_eq!(pipeline.stats().events, 200);
    }

    #[test]
    fn shutdown_flushes_queued_events() {
        let log = InMemoryLog::new();
        let table = InMemoryCommitTable::new();
        let pipeline = start(log.clone(), &table, &PipelineConfig::default());

        for i in 1..=10u64 {
            pipeline
                .append(PipelineEntry::silent(WalEvent::Abort {
                    start_ts: Timestamp::new(i),
                }))
                .unwrap();
        }
        pipeline.shutdown();

        let events: usize = WalReader::new(&log)
            .unwrap()
            .map(|b| b.unwrap().events.len())
            .sum();
        assert_eq!(events, 10);
        assert!(matches!(
            pipeline.append(PipelineEntry::silent(WalEvent::Abort {
                start_ts: Timestamp::new(11)
            })),
            Err(TsoError::Shutdown)
        ));
    }

    fn grant(conn: &Connection, id: u64, start: u64) -> PipelineEntry {
        let start_ts = Timestamp::new(start);
        PipelineEntry::unlogged(
            WalEvent::Timestamp { start_ts },
            conn.clone(),
            Reply {
                request_id: id,
                response: Response::Timestamp(start_ts),
            },
        )
    }

    fn logged_events(log: &InMemoryLog) -> Vec<WalEvent> {
        WalReader::new(log)
            .unwrap()
            .flat_map(|b| b.unwrap().events)
            .collect()
    }

    #[test]
    fn unlogged_grants_only_log_reservations() {
        let log = InMemoryLog::new();
        let table = InMemoryCommitTable::new();
        let config = PipelineConfig::new().timestamp_reservation(100);
        let pipeline = start(log.clone(), &table, &config);
        let (conn, replies) = Connection::open(1);

        for (id, start) in [(0, 3), (1, 4), (2, 103), (3, 104)] {
            pipeline.append(grant(&conn, id, start)).unwrap();
            assert_eq!(replies.recv_timeout(Duration::from_secs(5)).unwrap().request_id, id);
        }
        pipeline.shutdown();

        assert_eq!(
            logged_events(&log),
            vec![
                WalEvent::Reserve {
                    upper_bound: Timestamp::new(103)
                },
                WalEvent::Reserve {
                    upper_bound: Timestamp::new(204)
                },
            ]
        );
    }

    #[test]
    fn grants_below_the_logged_bound_need_no_reservation() {
        let log = InMemoryLog::new();
        let table = InMemoryCommitTable::new();
        let writer = WalWriter::new(Box::new(log.clone()), true).unwrap();
        let pipeline = DurabilityPipeline::start(
            writer,
            Box::new(table.client()),
            &PipelineConfig::default(),
            Timestamp::new(50),
        )
        .unwrap();
        let (conn, replies) = Connection::open(1);

        pipeline.append(grant(&conn, 0, 50)).unwrap();
        replies.recv_timeout(Duration::from_secs(5)).unwrap();
        pipeline.shutdown();

        assert!(log.data().is_empty());
    }

    struct RefusingLog;

    impl LogBackend for RefusingLog {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            Err(StorageError::ReadPastEnd { offset, len, size: 0 })
        }
        fn append(&mut self, _data: &[u8]) -> StorageResult<u64> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
        fn flush(&mut self) -> StorageResult<()> {
            Ok(())
        }
        fn size(&self) -> StorageResult<u64> {
            Ok(0)
        }
        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }
        fn truncate(&mut self, _new_size: u64) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_append_withholds_every_reply() {
        let table = InMemoryCommitTable::new();
        let writer = WalWriter::new(Box::new(RefusingLog), true).unwrap();
        let pipeline =
            DurabilityPipeline::start(
                writer,
                Box::new(table.client()),
                &PipelineConfig::default(),
                Timestamp::ZERO,
            )
            .unwrap();
        let (conn, replies) = Connection::open(1);

        for i in 0..5u64 {
            pipeline.append(commit_entry(&conn, i, i * 2 + 1, i * 2 + 2)).unwrap();
        }
        pipeline.shutdown();

        assert_eq!(replies.try_iter().count(), 0);
        assert!(table.is_empty());
        let stats = pipeline.stats();
        assert!(stats.faults >= 1);
        assert_eq!(stats.replies, 0);
        assert!(pipeline.last_fault().unwrap().contains("disk full"));
    }

    #[test]
    fn commit_table_failure_is_a_durability_fault() {
        let table = InMemoryCommitTable::new();
        let client = table.client();
        client.close();
        let writer = WalWriter::new(Box::new(InMemoryLog::new()), true).unwrap();
        let pipeline =
            DurabilityPipeline::start(
                writer,
                Box::new(client),
                &PipelineConfig::default(),
                Timestamp::ZERO,
            )
            .unwrap();
        let (conn, replies) = Connection::open(1);

        pipeline.append(commit_entry(&conn, 0, 1, 2)).unwrap();
        pipeline.shutdown();

        assert_eq!(replies.try_iter().count(), 0);
        assert_eq!(pipeline.stats().faults, 1);
    }

    /// Records applied updates and fails them while `fail` is set.
    struct RecordingTable {
        inner: InMemoryCommitTableClient,
        fail: Arc<AtomicBool>,
        applied: Arc<Mutex<Vec<WalEvent>>>,
    }

    impl RecordingTable {
        fn check(&self) -> CoreResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::io("commit table", "unavailable"));
            }
            Ok(())
        }
    }

    impl CommitTable for RecordingTable {
        fn read_low_watermark(&self) -> CoreResult<Timestamp> {
            self.inner.read_low_watermark()
        }
        fn get_commit_timestamp(&self, start_ts: Timestamp) -> CoreResult<Option<Timestamp>> {
            self.inner.get_commit_timestamp(start_ts)
        }
        fn put(&self, start_ts: Timestamp, commit_ts: Timestamp) -> CoreResult<()> {
            self.check()?;
            self.applied.lock().push(WalEvent::Commit { start_ts, commit_ts });
            self.inner.put(start_ts, commit_ts)
        }
        fn complete_transaction(&self, start_ts: Timestamp) -> CoreResult<()> {
            self.inner.complete_transaction(start_ts)
        }
        fn update_low_watermark(&self, low_watermark: Timestamp) -> CoreResult<()> {
            self.check()?;
            self.applied.lock().push(WalEvent::LowWatermark { low_watermark });
            self.inner.update_low_watermark(low_watermark)
        }
    }

    fn wait_for_faults(pipeline: &DurabilityPipeline, faults: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.stats().faults < faults {
            assert!(Instant::now() < deadline, "fault {faults} never happened");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn logged_commit_reaches_table_before_later_watermark() {
        let table = InMemoryCommitTable::new();
        let fail = Arc::new(AtomicBool::new(true));
        let applied = Arc::new(Mutex::new(Vec::new()));
        let recording = RecordingTable {
            inner: table.client(),
            fail: Arc::clone(&fail),
            applied: Arc::clone(&applied),
        };
        let writer = WalWriter::new(Box::new(InMemoryLog::new()), true).unwrap();
        let pipeline = DurabilityPipeline::start(
            writer,
            Box::new(recording),
            &PipelineConfig::default(),
            Timestamp::ZERO,
        )
        .unwrap();
        let (conn, replies) = Connection::open(1);

        pipeline.append(commit_entry(&conn, 0, 1, 2)).unwrap();
        wait_for_faults(&pipeline, 1);
        pipeline
            .append(PipelineEntry::silent(WalEvent::LowWatermark {
                low_watermark: Timestamp::new(3),
            }))
            .unwrap();
        wait_for_faults(&pipeline, 2);
        assert_eq!(table.low_watermark(), Timestamp::ZERO);

        fail.store(false, Ordering::SeqCst);
        pipeline.append(commit_entry(&conn, 1, 4, 5)).unwrap();
        assert_eq!(replies.recv_timeout(Duration::from_secs(5)).unwrap().request_id, 1);

        assert_eq!(
            *applied.lock(),
            vec![
                WalEvent::Commit {
                    start_ts: Timestamp::new(1),
                    commit_ts: Timestamp::new(2)
                },
                WalEvent::LowWatermark {
                    low_watermark: Timestamp::new(3)
                },
                WalEvent::Commit {
                    start_ts: Timestamp::new(4),
                    commit_ts: Timestamp::new(5)
                },
            ]
        );
        assert_eq!(table.commit_timestamp(Timestamp::new(1)), Some(Timestamp::new(2)));
        assert!(replies.try_recv().is_err());
    }

    #[test]
    fn unlogged_grant_waits_for_pending_commit() {
        let table = InMemoryCommitTable::new();
        let fail = Arc::new(AtomicBool::new(true));
        let recording = RecordingTable {
            inner: table.client(),
            fail: Arc::clone(&fail),
            applied: Arc::new(Mutex::new(Vec::new())),
        };
        let writer = WalWriter::new(Box::new(InMemoryLog::new()), true).unwrap();
        let pipeline = DurabilityPipeline::start(
            writer,
            Box::new(recording),
            &PipelineConfig::default(),
            Timestamp::new(100),
        )
        .unwrap();
        let (conn, replies) = Connection::open(1);

        pipeline.append(commit_entry(&conn, 0, 1, 2)).unwrap();
        wait_for_faults(&pipeline, 1);
        pipeline.append(grant(&conn, 1, 3)).unwrap();
        wait_for_faults(&pipeline, 2);
        assert!(replies.try_recv().is_err());

        fail.store(false, Ordering::SeqCst);
        pipeline.append(grant(&conn, 2, 4)).unwrap();
        assert_eq!(replies.recv_timeout(Duration::from_secs(5)).unwrap().request_id, 2);
        assert_eq!(table.commit_timestamp(Timestamp::new(1)), Some(Timestamp::new(2)));
    }

    #[test]
    fn reject_policy_reports_backpressure() {
        // No consumer drains this queue.
        let (sender, receiver) = channel::bounded::<Command>(1);
        let pipeline = DurabilityPipeline {
            sender,
            backpressure: Backpressure::Reject,
            capacity: 1,
            shared: Arc::new(Shared::default()),
            consumer: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        };
        let event = WalEvent::Abort {
            start_ts: Timestamp::new(1),
        };

        pipeline.append(PipelineEntry::silent(event)).unwrap();
        assert!(matches!(
            pipeline.append(PipelineEntry::silent(event)),
            Err(TsoError::Backpressure { capacity: 1 })
        ));
        drop(receiver);
    }

    #[test]
    fn disconnected_connection_is_not_a_fault() {
        let table = InMemoryCommitTable::new();
        let pipeline = start(InMemoryLog::new(), &table, &PipelineConfig::default());
        let (conn, replies) = Connection::open(1);
        drop(replies);

        pipeline.append(commit_entry(&conn, 0, 1, 2)).unwrap();
        pipeline.shutdown();

        let stats = pipeline.stats();
        assert_eq!(stats.faults, 0);
        assert_eq!(stats.discarded_replies, 1);
        assert_eq!(table.commit_timestamp(Timestamp::new(1)), Some(Timestamp::new(2)));
    }
}
