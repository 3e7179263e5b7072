//! Events recorded in the write-ahead log and their encoding.
//!
//! A batch payload is a plain concatenation of encoded events:
//!
//! ```text
//! | opcode (1) | param count (1) | params (8 bytes big-endian each) |
//! ```

use crate::error::{TsoError, TsoResult};
use bytes::{Buf, BufMut, BytesMut};
use sitx_core::Timestamp;

/// Maximum number of parameters one event may carry.
pub const MAX_PARAMS: usize = 8;

/// Opcodes of logged events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WalOp {
    /// A start timestamp was granted.
    Timestamp = 1,
    /// A transaction committed.
    Commit = 2,
    /// A transaction aborted.
    Abort = 3,
    /// The low watermark advanced.
    LowWatermark = 4,
    /// Timestamps up to a bound were reserved for unlogged grants.
    Reserve = 5,
}

impl WalOp {
    /// Returns the opcode byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses an opcode byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Timestamp),
            2 => Some(Self::Commit),
            3 => Some(Self::Abort),
            4 => Some(Self::LowWatermark),
            5 => Some(Self::Reserve),
            _ => None,
        }
    }

    /// Number of parameters an event with this opcode carries.
    #[must_use]
    pub const fn param_count(self) -> usize {
        match self {
            Self::Commit => 2,
            Self::Timestamp | Self::Abort | Self::LowWatermark | Self::Reserve => 1,
        }
    }

    /// Human-readable name, as printed by inspection tools.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Timestamp => "TIMESTAMP",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::LowWatermark => "LOW_WATERMARK",
            Self::Reserve => "RESERVE",
        }
    }
}

/// A decision or grant recorded by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalEvent {
    /// A start timestamp was handed out.
    Timestamp {
        /// The granted start timestamp.
        start_ts: Timestamp,
    },
    /// A transaction committed.
    Commit {
        /// Start timestamp of the transaction.
        start_ts: Timestamp,
        /// Its commit timestamp.
        commit_ts: Timestamp,
    },
    /// A transaction aborted.
    Abort {
        /// Start timestamp of the transaction.
        start_ts: Timestamp,
    },
    /// The low watermark advanced.
    LowWatermark {
        /// The new low watermark.
        low_watermark: Timestamp,
    },
    /// Start timestamps up to `upper_bound` may be granted without being
    /// logged one by one.
    Reserve {
        /// Highest reserved timestamp.
        upper_bound: Timestamp,
    },
}

impl WalEvent {
    /// Returns the event's opcode.
    #[must_use]
    pub const fn op(&self) -> WalOp {
        match self {
            Self::Timestamp { .. } => WalOp::Timestamp,
            Self::Commit { .. } => WalOp::Commit,
            Self::Abort { .. } => WalOp::Abort,
            Self::LowWatermark { .. } => WalOp::LowWatermark,
            Self::Reserve { .. } => WalOp::Reserve,
        }
    }

    /// Returns the largest timestamp the event mentions.
    #[must_use]
    pub fn max_timestamp(&self) -> Timestamp {
        match *self {
            Self::Timestamp { start_ts } | Self::Abort { start_ts } => start_ts,
            Self::Commit { start_ts, commit_ts } => start_ts.max(commit_ts),
            Self::LowWatermark { low_watermark } => low_watermark,
            Self::Reserve { upper_bound } => upper_bound,
        }
    }

    /// Size of the encoded event in bytes.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        2 + self.op().param_count() * 8
    }

    /// Appends the encoded event to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        let op = self.op();
        buf.reserve(self.encoded_len());
        buf.put_u8(op.as_byte());
        // Bounded by MAX_PARAMS.
        buf.put_u8(op.param_count() as u8);
        match *self {
            Self::Timestamp { start_ts } | Self::Abort { start_ts } => {
                buf.put_u64(start_ts.as_u64());
            }
            Self::Commit { start_ts, commit_ts } => {
                buf.put_u64(start_ts.as_u64());
                buf.put_u64(commit_ts.as_u64());
            }
            Self::LowWatermark { low_watermark } => buf.put_u64(low_watermark.as_u64()),
            Self::Reserve { upper_bound } => buf.put_u64(upper_bound.as_u64()),
        }
    }

    fn from_params(op: WalOp, params: &[u64]) -> Self {
        match op {
            WalOp::Timestamp => Self::Timestamp {
                start_ts: Timestamp::new(params[0]),
            },
            WalOp::Commit => Self::Commit {
                start_ts: Timestamp::new(params[0]),
                commit_ts: Timestamp::new(params[1]),
            },
            WalOp::Abort => Self::Abort {
                start_ts: Timestamp::new(params[0]),
            },
            WalOp::LowWatermark => Self::LowWatermark {
                low_watermark: Timestamp::new(params[0]),
            },
            WalOp::Reserve => Self::Reserve {
                upper_bound: Timestamp::new(params[0]),
            },
        }
    }
}

/// Encodes events into one batch payload.
#[must_use]
pub fn encode_events(events: &[WalEvent]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(events.iter().map(WalEvent::encoded_len).sum());
    for event in events {
        event.encode(&mut buf);
    }
    buf
}

/// Decodes every event of a batch payload.
///
/// `offset` is the log offset of the enclosing batch and only feeds error
/// messages.
///
/// # Errors
///
/// Returns [`TsoError::Corrupted`] for an unknown opcode, a parameter count
/// that does not match the opcode, or a payload that ends mid-event.
pub fn decode_events(offset: u64, mut payload: &[u8]) -> TsoResult<Vec<WalEvent>> {
    let mut events = Vec::new();
    let mut params = [0u64; MAX_PARAMS];

    while payload.has_remaining() {
        if payload.remaining() < 2 {
            return Err(TsoError::corrupted(offset, "event header cut short"));
        }
        let byte = payload.get_u8();
        let count = usize::from(payload.get_u8());

        let op = WalOp::from_byte(byte)
            .ok_or_else(|| TsoError::corrupted(offset, format!("unknown opcode {byte}")))?;
        if count != op.param_count() {
            return Err(TsoError::corrupted(
                offset,
                format!("{} event with {count} params", op.name()),
            ));
        }
        if payload.remaining() < count * 8 {
            return Err(TsoError::corrupted(
                offset,
                format!("{} event params cut short", op.name()),
            ));
        }
        for param in params.iter_mut().take(count) {
            *param = payload.get_u64();
        }
        events.push(WalEvent::from_params(op, &params[..count]));
    }

    Ok(events)
}
