//! # sitx Testkit
//!
//! Test utilities for sitx.
//!
//! This crate provides:
//! - [`TestCluster`], an in-process oracle, commit table, store and manager
//! - Fault-injecting wrappers for logs, stores and commit tables
//! - Property-based test generators using proptest
//! - A workload harness that checks snapshot reads against a model
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sitx_testkit::prelude::*;
//!
//! #[test]
//! fn commit_is_visible() {
//!     let cluster = TestCluster::new();
//!     let table = cluster.table();
//!     let mut tx = cluster.manager.begin().unwrap();
//!     table.put(&mut tx, "row", FAMILY, "q", b"v".to_vec()).unwrap();
//!     cluster.manager.commit(&mut tx).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use faults::{FailingLog, FlakyCommitTable, FlakyStore};
pub use fixtures::{ClusterBuilder, TestCluster, FAMILY, RAW_FAMILY, TABLE};
