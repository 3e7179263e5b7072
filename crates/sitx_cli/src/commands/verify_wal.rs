//! Verify WAL command implementation.

use sitx_core::Timestamp;
use sitx_storage::{FileLog, LogBackend};
use sitx_tso::wal::WalReader;
use sitx_tso::WalEvent;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Intact batches read.
    pub batches: usize,
    /// Events in intact batches.
    pub events: usize,
    /// Commit events.
    pub commits: usize,
    /// Abort events.
    pub aborts: usize,
    /// Highest timestamp any event mentions.
    pub max_timestamp: Timestamp,
    /// Highest logged low watermark.
    pub low_watermark: Timestamp,
    /// End of the last intact batch.
    pub valid_len: u64,
    /// Size of the log.
    pub log_len: u64,
    /// Set when the log ends with an incomplete batch.
    pub torn_tail: bool,
    /// The corruption that stopped the scan, if any.
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify-wal command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("WAL file not found: {}", path.display()).into());
    }
    println!("Verifying WAL at {}", path.display());
    println!();

    let log = FileLog::open(path)?;
    let result = verify(&log)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ WAL verification passed");
        Ok(())
    } else {
        println!("✗ WAL verification failed");
        Err("Verification failed".into())
    }
}

/// Scans every batch of `log`.
///
/// Corruption is reported in the result rather than returned; only a
/// failure to read the log at all is an error.
pub fn verify(log: &dyn LogBackend) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let mut reader = WalReader::new(log)?;

    for batch in &mut reader {
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                result.error = Some(e.to_string());
                break;
            }
        };
        result.batches += 1;
        result.events += batch.events.len();
        for event in &batch.events {
            result.max_timestamp = result.max_timestamp.max(event.max_timestamp());
            match *event {
                WalEvent::Commit { .. } => result.commits += 1,
                WalEvent::Abort { .. } => result.aborts += 1,
                WalEvent::LowWatermark { low_watermark } => {
                    result.low_watermark = result.low_watermark.max(low_watermark);
                }
                WalEvent::Timestamp { .. } | WalEvent::Reserve { .. } => {}
            }
        }
    }

    result.valid_len = reader.valid_len();
    result.log_len = reader.log_len();
    result.torn_tail = result.error.is_none() && reader.truncated_tail();
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Batches:        {}", result.batches);
    println!("  Events:         {}", result.events);
    println!("  Commits:        {}", result.commits);
    println!("  Aborts:         {}", result.aborts);
    println!("  Max timestamp:  {}", result.max_timestamp.as_u64());
    println!("  Low watermark:  {}", result.low_watermark.as_u64());
    println!("  Valid bytes:    {} of {}", result.valid_len, result.log_len);
    if result.torn_tail {
        println!("  Incomplete trailing batch (dropped on recovery)");
    }
    if let Some(error) = &result.error {
        println!("  Error: {error}");
    }
}
