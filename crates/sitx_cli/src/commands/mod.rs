//! CLI command implementations.

pub mod dump_wal;
pub mod verify_wal;
