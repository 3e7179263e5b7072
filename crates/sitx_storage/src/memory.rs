//! In-memory log backend for testing.

use crate::backend::LogBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory append-only log.
///
/// Besides the appended bytes, the log remembers how much of its content
/// has been made durable by `flush`/`sync`. [`InMemoryLog::crash`] drops the
/// non-durable tail, which lets tests observe exactly what a real log would
/// still hold after a power loss.
///
/// Clones share the same underlying log, so a test can keep a handle while
/// the writer owns another.
///
/// # Example
///
/// ```rust
/// use sitx_storage::{LogBackend, InMemoryLog};
///
/// let mut log = InMemoryLog::new();
/// log.append(b"batch-1").unwrap();
/// log.flush().unwrap();
/// log.append(b"batch-2").unwrap();
///
/// log.crash();
/// assert_eq!(log.data(), b"batch-1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    inner: Arc<RwLock<LogState>>,
}

#[derive(Debug, Default)]
struct LogState {
    data: Vec<u8>,
    durable_len: usize,
    flushes: u64,
}

impl InMemoryLog {
    /// Creates a new empty in-memory log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log whose existing content is already durable.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        let durable_len = data.len();
        Self {
            inner: Arc::new(RwLock::new(LogState {
                data,
                durable_len,
                flushes: 0,
            })),
        }
    }

    /// Returns a copy of all appended data, durable or not.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.inner.read().data.clone()
    }

    /// Returns the number of bytes that survived the last flush.
    #[must_use]
    pub fn durable_len(&self) -> usize {
        self.inner.read().durable_len
    }

    /// Returns how many times the log has been flushed or synced.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.read().flushes
    }

    /// Simulates a crash: every byte appended after the last flush is lost.
    pub fn crash(&self) {
        let mut state = self.inner.write();
        let durable = state.durable_len;
        state.data.truncate(durable);
    }

    fn mark_durable(&self) {
        let mut state = self.inner.write();
        state.durable_len = state.data.len();
        state.flushes += 1;
    }
}

impl LogBackend for InMemoryLog {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.inner.read();
        let size = state.data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > state.data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(state.data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut state = self.inner.write();
        let offset = state.data.len() as u64;
        state.data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.mark_durable();
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.read().data.len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.mark_durable();
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.inner.write();
        let current = state.data.len() as u64;

        if new_size > current {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate log of {current} bytes to {new_size} bytes"),
            )));
        }

        let new_len = new_size as usize;
        state.data.truncate(new_len);
        state.durable_len = state.durable_len.min(new_len);
        Ok(())
    }
}
