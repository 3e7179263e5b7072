//! File-based log backend for persistent storage.

use crate::backend::LogBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based append-only log.
///
/// # Durability
///
/// - `flush()` pushes buffered bytes to the OS and calls `File::sync_data()`,
///   so a flushed write-ahead log batch survives power loss
/// - `sync()` additionally persists file metadata via `File::sync_all()`
///
/// # Example
///
/// ```no_run
/// use sitx_storage::{LogBackend, FileLog};
/// use std::path::Path;
///
/// let mut log = FileLog::open(Path::new("tso.wal")).unwrap();
/// log.append(b"batch").unwrap();
/// log.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileLog {
    /// Opens or creates a log file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState { file, size }),
        })
    }

    /// Opens or creates a log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileLog {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock();
        let size = state.size;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.lock();
        let offset = state.size;
        if data.is_empty() {
            return Ok(offset);
        }

        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.file.flush()?;
        state.file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.lock().size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.file.flush()?;
        state.file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        if new_size > state.size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate log of {} bytes to {} bytes",
                    state.size, new_size
                ),
            )));
        }

        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_log_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tso.wal");

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(log.path(), path);
    }

    #[test]
    fn file_log_append_and_read() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(&dir.path().join("tso.wal")).unwrap();

        assert_eq!(log.append(b"hello").unwrap(), 0);
        assert_eq!(log.append(b" world").unwrap(), 5);
        assert_eq!(log.read_at(6, 5).unwrap(), b"world");
        assert!(matches!(
            log.read_at(10, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn file_log_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tso.wal");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(b"persistent batch").unwrap();
            log.flush().unwrap();
        }

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.size().unwrap(), 16);
        assert_eq!(log.read_at(0, 16).unwrap(), b"persistent batch");
    }

    #[test]
    fn file_log_truncate() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(&dir.path().join("tso.wal")).unwrap();
        log.append(b"hello world").unwrap();

        log.truncate(5).unwrap();
        assert_eq!(log.size().unwrap(), 5);
        assert!(log.truncate(6).is_err());
    }

    #[test]
    fn file_log_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tso.wal");

        let log = FileLog::open_with_create_dirs(&path).unwrap();
        assert_eq!(log.size().unwrap(), 0);
        assert!(path.exists());
    }
}
