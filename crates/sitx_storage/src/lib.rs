//! # sitx Storage
//!
//! Storage collaborators for sitx.
//!
//! This crate provides the two lowest-level abstractions the transaction
//! layer is built on:
//!
//! - **Durable logs** ([`LogBackend`]) - opaque append-only byte stores used
//!   by the timestamp oracle's write-ahead log. They do not interpret the
//!   bytes they hold.
//! - **Versioned key-value stores** ([`VersionedStore`]) - multi-version cell
//!   storage addressed by `(table, row, family, qualifier, version)` with
//!   buffered writes, exact-version point operations, per-family metadata and
//!   a native compaction merge fed by a caller-filtered cell list.
//!
//! ## Design Principles
//!
//! - Backends are simple (read, append, flush); sitx owns all log formats
//! - Stores know nothing about transactions, shadow cells or timestamps
//! - Everything is `Send + Sync` for concurrent access
//!
//! ## Available Implementations
//!
//! - [`InMemoryLog`] - For testing and ephemeral logs
//! - [`FileLog`] - For persistent logs using OS file APIs
//! - [`InMemoryStore`] - In-process versioned store for tests and embedding
//!
//! ## Example
//!
//! ```rust
//! use sitx_storage::{LogBackend, InMemoryLog};
//!
//! let mut log = InMemoryLog::new();
//! let offset = log.append(b"hello world").unwrap();
//! let data = log.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cell;
mod error;
mod file;
mod memory;
mod memstore;
mod store;

pub use backend::LogBackend;
pub use cell::{CellKey, CellKind, FamilyDescriptor, StoredCell, TRANSACTIONAL_FLAG};
pub use error::{StorageError, StorageResult};
pub use file::FileLog;
pub use memory::InMemoryLog;
pub use memstore::InMemoryStore;
pub use store::{CompactionKind, VersionedStore};
