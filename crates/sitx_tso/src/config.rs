//! Timestamp oracle configuration.

use std::time::Duration;

/// What a producer does when the pipeline queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Wait for room in the queue.
    #[default]
    Block,
    /// Fail the request with [`crate::TsoError::Backpressure`].
    Reject,
}

/// Configuration for the durability pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Encoded bytes after which a batch is flushed even if more events
    /// are ready.
    pub batch_size: usize,

    /// Bound on events waiting for the consumer.
    pub queue_capacity: usize,

    /// Policy applied when the queue is full.
    pub backpressure: Backpressure,

    /// Whether start timestamp grants are written to the log before they
    /// are replied to.
    pub log_timestamp_requests: bool,

    /// How many timestamps one reservation covers when grants are not
    /// logged. A restart resumes above the last reserved timestamp.
    pub timestamp_reservation: u64,

    /// Whether each batch is synced to stable storage, rather than just
    /// flushed.
    pub sync_on_flush: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 64 * 1024,
            queue_capacity: 4096,
            backpressure: Backpressure::Block,
            log_timestamp_requests: true,
            timestamp_reservation: 10_000,
            sync_on_flush: true,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size threshold.
    #[must_use]
    pub const fn batch_size(mut self, bytes: usize) -> Self {
        self.batch_size = bytes;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, events: usize) -> Self {
        self.queue_capacity = events;
        self
    }

    /// Sets the backpressure policy.
    #[must_use]
    pub const fn backpressure(mut self, policy: Backpressure) -> Self {
        self.backpressure = policy;
        self
    }

    /// Sets whether timestamp grants are logged.
    #[must_use]
    pub const fn log_timestamp_requests(mut self, value: bool) -> Self {
        self.log_timestamp_requests = value;
        self
    }

    /// Sets the size of a timestamp reservation.
    #[must_use]
    pub const fn timestamp_reservation(mut self, timestamps: u64) -> Self {
        self.timestamp_reservation = timestamps;
        self
    }

    /// Sets whether batches are synced.
    #[must_use]
    pub const fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }
}

/// Configuration for [`crate::LocalTsoClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request waits for its reply.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
