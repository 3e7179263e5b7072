//! Write-ahead log of oracle decisions.
//!
//! Every pipeline flush appends exactly one framed batch:
//!
//! ```text
//! | magic "SWAL" (4) | version u16 LE (2) | length u32 LE (4) | payload (N) | crc32 LE (4) |
//! ```
//!
//! The checksum covers everything before it. The payload is a sequence of
//! encoded [`crate::WalEvent`]s.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (clean end of log)
//!
//! - Fewer than a header's worth of bytes left
//! - A header whose declared length runs past the end of the log
//!
//! Both are the remains of a flush that never completed. Its replies were
//! never sent, so dropping it loses nothing a client observed.
//!
//! ### Fatal
//!
//! - Bad magic or an unsupported version
//! - Checksum mismatch
//! - An undecodable event inside an intact batch

mod reader;
mod writer;

pub use reader::{WalBatch, WalReader};
pub use writer::WalWriter;

/// Magic bytes opening every batch.
pub const WAL_MAGIC: [u8; 4] = *b"SWAL";

/// Current batch format version.
pub const WAL_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
pub(crate) const HEADER_SIZE: usize = 10;

pub(crate) const CRC_SIZE: usize = 4;
