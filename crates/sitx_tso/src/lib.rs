//! # sitx TSO
//!
//! The timestamp oracle: the single authority that hands out start and
//! commit timestamps and records every transaction outcome.
//!
//! Requests are sequenced by [`TsoServer`], made durable in batches by the
//! [`DurabilityPipeline`] and only then answered. The pipeline writes one
//! framed record per batch to a [`sitx_storage::LogBackend`]; on startup
//! the server replays that log so timestamps keep increasing across
//! restarts.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sitx_core::{CommitOutcome, InMemoryCommitTable, TsoClient};
//! use sitx_storage::InMemoryLog;
//! use sitx_tso::{ClientConfig, LocalTsoClient, PipelineConfig, TsoServer};
//!
//! let table = InMemoryCommitTable::new();
//! let server = TsoServer::open(
//!     Box::new(InMemoryLog::new()),
//!     Box::new(table.client()),
//!     PipelineConfig::default(),
//! )
//! .unwrap();
//! let client = LocalTsoClient::connect(Arc::new(server), ClientConfig::default());
//!
//! let start = client.start_timestamp().unwrap();
//! let outcome = client.commit(start).unwrap();
//! assert!(matches!(outcome, CommitOutcome::Committed(ts) if ts > start));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connection;
mod error;
mod event;
mod oracle;
mod pipeline;
mod recovery;
mod server;
pub mod wal;

pub use client::LocalTsoClient;
pub use config::{Backpressure, ClientConfig, PipelineConfig};
pub use connection::{Connection, Reply, Response};
pub use error::{TsoError, TsoResult};
pub use event::{decode_events, encode_events, WalEvent, WalOp, MAX_PARAMS};
pub use oracle::TimestampOracle;
pub use pipeline::{DurabilityPipeline, PipelineEntry, PipelineStats};
pub use recovery::{recover, RecoveredState};
pub use server::TsoServer;
