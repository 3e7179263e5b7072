//! Streaming batch reader.

use super::{CRC_SIZE, HEADER_SIZE, WAL_MAGIC, WAL_VERSION};
use crate::error::{TsoError, TsoResult};
use crate::event::{decode_events, WalEvent};
use sitx_storage::LogBackend;

/// Bytes fetched from the backend per read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// One intact batch read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalBatch {
    /// Offset of the batch in the log.
    pub offset: u64,
    /// Framed length of the batch, envelope included.
    pub len: u64,
    /// The batch's events in logged order.
    pub events: Vec<WalEvent>,
}

/// A streaming iterator over the batches of a log.
///
/// Memory use is bounded by the largest batch, not the log size. A batch
/// cut short by the end of the log ends iteration cleanly; anything else
/// that fails validation yields one error and then ends iteration.
///
/// # Example
///
/// ```ignore
/// let mut reader = WalReader::new(&log)?;
/// for batch in &mut reader {
///     let batch = batch?;
///     // ...
/// }
/// let intact = reader.valid_len();
/// ```
pub struct WalReader<'a> {
    backend: &'a dyn LogBackend,
    total_size: u64,
    /// Start of the next batch; also the end of the last intact one.
    offset: u64,
    buffer: Vec<u8>,
    /// Log offset of `buffer[0]`.
    buffer_start: u64,
    buffer_len: usize,
    finished: bool,
    truncated_tail: bool,
}

impl<'a> WalReader<'a> {
    /// Creates a reader positioned at the start of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn new(backend: &'a dyn LogBackend) -> TsoResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            offset: 0,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_start: 0,
            buffer_len: 0,
            finished: false,
            truncated_tail: false,
        })
    }

    /// Returns the end of the last intact batch read so far.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    /// Returns the size of the log when the reader was created.
    #[must_use]
    pub fn log_len(&self) -> u64 {
        self.total_size
    }

    /// Returns true if iteration stopped at an incomplete batch.
    #[must_use]
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Makes `need` bytes starting at the current offset available.
    ///
    /// Returns `false` if the log ends first.
    fn ensure_buffered(&mut self, need: usize) -> TsoResult<bool> {
        if self.offset + need as u64 > self.total_size {
            return Ok(false);
        }

        let pos = (self.offset - self.buffer_start) as usize;
        if self.buffer_len - pos >= need {
            return Ok(true);
        }

        self.buffer.copy_within(pos..self.buffer_len, 0);
        self.buffer_len -= pos;
        self.buffer_start = self.offset;

        if need > self.buffer.len() {
            self.buffer.resize(need.next_power_of_two(), 0);
        }

        let read_from = self.buffer_start + self.buffer_len as u64;
        let remaining = usize::try_from(self.total_size - read_from).unwrap_or(usize::MAX);
        let to_read = (self.buffer.len() - self.buffer_len).min(remaining);
        if to_read > 0 {
            let data = self.backend.read_at(read_from, to_read)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len >= need)
    }

    fn read_next(&mut self) -> TsoResult<Option<WalBatch>> {
        let offset = self.offset;

        if !self.ensure_buffered(HEADER_SIZE)? {
            self.truncated_tail = offset < self.total_size;
            return Ok(None);
        }

        let pos = (offset - self.buffer_start) as usize;
        let header = &self.buffer[pos..pos + HEADER_SIZE];

        if header[0..4] != WAL_MAGIC {
            return Err(TsoError::corrupted(offset, "invalid magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != WAL_VERSION {
            return Err(TsoError::corrupted(
                offset,
                format!("unsupported version {version}"),
            ));
        }
        let payload_len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;

        if !self.ensure_buffered(total_len)? {
            self.truncated_tail = true;
            return Ok(None);
        }

        // The buffer may have been compacted.
        let pos = (offset - self.buffer_start) as usize;
        let payload_end = pos + HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            self.buffer[payload_end],
            self.buffer[payload_end + 1],
            self.buffer[payload_end + 2],
            self.buffer[payload_end + 3],
        ]);
        let computed = crc32fast::hash(&self.buffer[pos..payload_end]);
        if stored != computed {
            return Err(TsoError::ChecksumMismatch {
                offset,
                expected: stored,
                actual: computed,
            });
        }

        let events = decode_events(offset, &self.buffer[pos + HEADER_SIZE..payload_end])?;
        self.offset += total_len as u64;

        Ok(Some(WalBatch {
            offset,
            len: total_len as u64,
            events,
        }))
    }
}

impl Iterator for WalReader<'_> {
    type Item = TsoResult<WalBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
