//! Batch framing and durable appends.

use super::{CRC_SIZE, HEADER_SIZE, WAL_MAGIC, WAL_VERSION};
use crate::error::{TsoError, TsoResult};
use sitx_storage::LogBackend;
use tracing::{error, warn};

/// Appends framed batches to a log backend.
///
/// The writer is owned by the pipeline's consumer thread, so it needs no
/// lock. After a failed append it truncates the log back to the end of the
/// last intact batch; if even that fails the writer refuses every further
/// append, since a batch written after a torn one would never be replayed.
pub struct WalWriter {
    backend: Box<dyn LogBackend>,
    sync_on_flush: bool,
    /// End of the last batch known to be intact.
    len: u64,
    poisoned: bool,
}

impl WalWriter {
    /// Creates a writer appending after the backend's current content.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(backend: Box<dyn LogBackend>, sync_on_flush: bool) -> TsoResult<Self> {
        let len = backend.size()?;
        Ok(Self {
            backend,
            sync_on_flush,
            len,
            poisoned: false,
        })
    }

    /// Frames `payload` as one batch, appends it and makes it durable.
    ///
    /// Returns the offset of the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The payload exceeds the maximum batch size (4 GiB)
    /// - The append, flush or sync fails
    /// - An earlier failure left the log tail unrecoverable
    pub fn append_batch(&mut self, payload: &[u8]) -> TsoResult<u64> {
        if self.poisoned {
            return Err(TsoError::corrupted(
                self.len,
                "log tail could not be rolled back after a failed append",
            ));
        }

        let frame = encode_frame(payload)?;
        match self.write_durable(&frame) {
            Ok(offset) => {
                self.len = offset + frame.len() as u64;
                Ok(offset)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    /// Returns the end of the last intact batch.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the writer refuses appends.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the backend.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn LogBackend> {
        self.backend
    }

    fn write_durable(&mut self, frame: &[u8]) -> TsoResult<u64> {
        let offset = self.backend.append(frame)?;
        if self.sync_on_flush {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        Ok(offset)
    }

    fn rollback(&mut self) {
        match self.backend.truncate(self.len) {
            Ok(()) => warn!(len = self.len, "rolled WAL back to last intact batch"),
            Err(e) => {
                error!(len = self.len, error = %e, "failed to roll back WAL tail, refusing further appends");
                self.poisoned = true;
            }
        }
    }
}

/// Wraps a payload in the batch envelope.
pub(crate) fn encode_frame(payload: &[u8]) -> TsoResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| TsoError::corrupted(0, "WAL batch payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&WAL_MAGIC);
    data.extend_from_slice(&WAL_VERSION.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitx_storage::{InMemoryLog, StorageResult};

    #[test]
    fn frame_layout() {
        let frame = encode_frame(b"abc").unwrap();

        assert_eq!(frame.len(), HEADER_SIZE + 3 + CRC_SIZE);
        assert_eq!(&frame[0..4], b"SWAL");
        assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), WAL_VERSION);
        assert_eq!(u32::from_le_bytes([frame[6], frame[7], frame[8], frame[9]]), 3);
        assert_eq!(&frame[10..13], b"abc");

        let crc = u32::from_le_bytes([frame[13], frame[14], frame[15], frame[16]]);
        assert_eq!(crc, crc32fast::hash(&frame[..13]));
    }

    #[test]
    fn append_is_durable() {
        let log = InMemoryLog::new();
        let mut writer = WalWriter::new(Box::new(log.clone()), true).unwrap();

        let first = writer.append_batch(b"one").unwrap();
        let second = writer.append_batch(b"two").unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, (HEADER_SIZE + 3 + CRC_SIZE) as u64);
        assert_eq!(log.durable_len() as u64, writer.len());
        assert_eq!(log.flush_count(), 2);
    }

    #[test]
    fn resumes_after_existing_content() {
        let log = InMemoryLog::with_data(vec![0u8; 17]);
        let mut writer = WalWriter::new(Box::new(log), false).unwrap();
        assert_eq!(writer.append_batch(b"x").unwrap(), 17);
    }

    /// Appends the frame, then fails to sync.
    struct TornLog {
        inner: InMemoryLog,
        fail_truncate: bool,
    }

    impl LogBackend for TornLog {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn sync(&mut self) -> StorageResult<()> {
            self.flush()
        }
        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            if self.fail_truncate {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "no truncate").into());
            }
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let log = InMemoryLog::new();
        let mut writer = WalWriter::new(
            Box::new(TornLog {
                inner: log.clone(),
                fail_truncate: false,
            }),
            true,
        )
        .unwrap();

        assert!(writer.append_batch(b"lost").is_err());
        assert!(log.data().is_empty());
        assert!(!writer.is_poisoned());
        assert!(writer.is_empty());
    }

    #[test]
    fn unrecoverable_tail_poisons_writer() {
        let mut writer = WalWriter::new(
            Box::new(TornLog {
                inner: InMemoryLog::new(),
                fail_truncate: true,
            }),
            true,
        )
        .unwrap();

        assert!(writer.append_batch(b"lost").is_err());
        assert!(writer.is_poisoned());
        assert!(writer.append_batch(b"next").unwrap_err().is_corruption());
    }
}
