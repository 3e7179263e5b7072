//! Request processing.

use crate::config::PipelineConfig;
use crate::connection::{Connection, Reply, Response};
use crate::error::{TsoError, TsoResult};
use crate::event::WalEvent;
use crate::oracle::TimestampOracle;
use crate::pipeline::{DurabilityPipeline, PipelineEntry, PipelineStats};
use crate::recovery::{recover, RecoveredState};
use crate::wal::WalWriter;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use sitx_core::{CommitTable, CoreError, Timestamp};
use sitx_storage::LogBackend;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// The timestamp oracle server.
///
/// Hands out start and commit timestamps, records every decision in the
/// write-ahead log through the [`DurabilityPipeline`] and answers each
/// request only once its decision is durable.
///
/// Timestamps are assigned and enqueued under one lock, so the log holds
/// events in timestamp order and a start timestamp is never replied to
/// before every commit with a smaller timestamp is in the commit table.
pub struct TsoServer {
    oracle: TimestampOracle,
    pipeline: DurabilityPipeline,
    log_timestamp_requests: bool,
    sequencer: Mutex<()>,
    next_connection: AtomicU64,
}

impl TsoServer {
    /// Recovers from `log` and starts serving.
    ///
    /// Recovery replays the log, drops a torn final batch, re-applies every
    /// logged commit and the low watermark to the commit table and resumes
    /// the timestamp sequence above anything ever logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupted or unreadable, or the commit
    /// table rejects the replayed state.
    pub fn open(
        mut log: Box<dyn LogBackend>,
        commit_table: Box<dyn CommitTable>,
        config: PipelineConfig,
    ) -> TsoResult<Self> {
        let recovered = recover(log.as_ref())?;

        if recovered.has_torn_tail() {
            warn!(
                valid_len = recovered.valid_len,
                log_len = recovered.log_len,
                "truncating incomplete WAL batch"
            );
            log.truncate(recovered.valid_len)?;
            log.sync()?;
        }
        restore_commit_table(commit_table.as_ref(), &recovered)?;

        let oracle = TimestampOracle::new(recovered.max_timestamp, recovered.low_watermark);
        let writer = WalWriter::new(log, config.sync_on_flush)?;
        let pipeline =
            DurabilityPipeline::start(writer, commit_table, &config, recovered.max_timestamp)?;

        info!(
            next_timestamp = %recovered.next_timestamp(),
            low_watermark = %recovered.low_watermark,
            log_timestamp_requests = config.log_timestamp_requests,
            "timestamp oracle started"
        );

        Ok(Self {
            oracle,
            pipeline,
            log_timestamp_requests: config.log_timestamp_requests,
            sequencer: Mutex::new(()),
            next_connection: AtomicU64::new(1),
        })
    }

    /// Opens a connection.
    #[must_use]
    pub fn connect(&self) -> (Connection, Receiver<Reply>) {
        Connection::open(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }

    /// Grants a start timestamp.
    ///
    /// Without per-grant logging the grant is still covered by a durable
    /// reservation before it is replied to.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline refuses the event.
    pub fn request_timestamp(&self, connection: &Connection, request_id: u64) -> TsoResult<()> {
        let _order = self.sequencer.lock();
        let start_ts = self.oracle.next_timestamp();
        let event = WalEvent::Timestamp { start_ts };
        let reply = Reply {
            request_id,
            response: Response::Timestamp(start_ts),
        };

        let entry = if self.log_timestamp_requests {
            PipelineEntry::logged(event, connection.clone(), reply)
        } else {
            PipelineEntry::unlogged(event, connection.clone(), reply)
        };
        self.pipeline.append(entry)
    }

    /// Decides the fate of a transaction.
    ///
    /// A transaction that started below the low watermark is aborted; any
    /// other is committed at a fresh timestamp.
    ///
    /// # Errors
    ///
    /// - [`TsoError::Core`] with an invalid argument if `start_ts` was never
    ///   issued
    /// - Whatever the pipeline returns when it refuses the event
    pub fn request_commit(
        &self,
        connection: &Connection,
        request_id: u64,
        start_ts: Timestamp,
    ) -> TsoResult<()> {
        let _order = self.sequencer.lock();
        self.check_issued(start_ts)?;

        let low_watermark = self.oracle.low_watermark();
        if start_ts < low_watermark {
            debug!(%start_ts, %low_watermark, "commit below low watermark, aborting");
            return self.pipeline.append(PipelineEntry::logged(
                WalEvent::Abort { start_ts },
                connection.clone(),
                Reply {
                    request_id,
                    response: Response::Aborted { start_ts },
                },
            ));
        }

        let commit_ts = self.oracle.next_timestamp();
        self.pipeline.append(PipelineEntry::logged(
            WalEvent::Commit { start_ts, commit_ts },
            connection.clone(),
            Reply {
                request_id,
                response: Response::Committed { start_ts, commit_ts },
            },
        ))
    }

    /// Records a client-initiated abort.
    ///
    /// # Errors
    ///
    /// Same as [`TsoServer::request_commit`].
    pub fn request_abort(
        &self,
        connection: &Connection,
        request_id: u64,
        start_ts: Timestamp,
    ) -> TsoResult<()> {
        let _order = self.sequencer.lock();
        self.check_issued(start_ts)?;
        self.pipeline.append(PipelineEntry::logged(
            WalEvent::Abort { start_ts },
            connection.clone(),
            Reply {
                request_id,
                response: Response::Aborted { start_ts },
            },
        ))
    }

    /// Advances the low watermark.
    ///
    /// Commits that started below the new watermark are aborted from now
    /// on. The commit table sees the new watermark once it is durable. A
    /// watermark at or below the current one is ignored.
    ///
    /// # Errors
    ///
    /// - [`TsoError::Core`] with an invalid argument if `ts` is beyond the
    ///   next timestamp to be issued
    /// - Whatever the pipeline returns when it refuses the event
    pub fn advance_low_watermark(&self, ts: Timestamp) -> TsoResult<()> {
        let _order = self.sequencer.lock();
        let next = self.oracle.last_timestamp().next();
        if ts > next {
            return Err(CoreError::invalid_argument(format!(
                "low watermark {ts} is beyond next timestamp {next}"
            ))
            .into());
        }
        if !self.oracle.advance_low_watermark(ts) {
            return Ok(());
        }
        debug!(low_watermark = %ts, "low watermark advanced");
        self.pipeline
            .append(PipelineEntry::silent(WalEvent::LowWatermark { low_watermark: ts }))
    }

    /// Returns the current low watermark.
    #[must_use]
    pub fn low_watermark(&self) -> Timestamp {
        self.oracle.low_watermark()
    }

    /// Returns the most recently issued timestamp.
    #[must_use]
    pub fn last_timestamp(&self) -> Timestamp {
        self.oracle.last_timestamp()
    }

    /// Returns pipeline counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Returns the most recent durability fault.
    #[must_use]
    pub fn last_fault(&self) -> Option<String> {
        self.pipeline.last_fault()
    }

    /// Flushes queued decisions and stops the pipeline.
    pub fn shutdown(&self) {
        info!("stopping timestamp oracle");
        self.pipeline.shutdown();
    }

    fn check_issued(&self, start_ts: Timestamp) -> TsoResult<()> {
        if start_ts == Timestamp::ZERO || start_ts > self.oracle.last_timestamp() {
            return Err(CoreError::invalid_argument(format!(
                "start timestamp {start_ts} was never issued"
            ))
            .into());
        }
        Ok(())
    }
}

fn restore_commit_table(table: &dyn CommitTable, recovered: &RecoveredState) -> TsoResult<()> {
    for &(start_ts, commit_ts) in &recovered.commits {
        table.put(start_ts, commit_ts)?;
    }
    if recovered.low_watermark > Timestamp::ZERO {
        table.update_low_watermark(recovered.low_watermark)?;
    }
    if !recovered.commits.is_empty() {
        info!(commits = recovered.commits.len(), "commit table restored from WAL");
    }
    Ok(())
}
