//! Dump WAL command implementation.

use serde::Serialize;
use sitx_storage::{FileLog, LogBackend};
use sitx_tso::wal::WalReader;
use sitx_tso::WalEvent;
use std::path::Path;

/// One event as printed.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EventInfo {
    /// Event name.
    pub op: &'static str,
    /// Start timestamp (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ts: Option<u64>,
    /// Commit timestamp (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_ts: Option<u64>,
    /// Low watermark (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_watermark: Option<u64>,
    /// Reserved upper bound (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<u64>,
}

impl From<&WalEvent> for EventInfo {
    fn from(event: &WalEvent) -> Self {
        let mut info = Self {
            op: event.op().name(),
            start_ts: None,
            commit_ts: None,
            low_watermark: None,
            reserved: None,
        };
        match *event {
            WalEvent::Timestamp { start_ts } | WalEvent::Abort { start_ts } => {
                info.start_ts = Some(start_ts.as_u64());
            }
            WalEvent::Commit {
                start_ts,
                commit_ts,
            } => {
                info.start_ts = Some(start_ts.as_u64());
                info.commit_ts = Some(commit_ts.as_u64());
            }
            WalEvent::LowWatermark { low_watermark } => {
                info.low_watermark = Some(low_watermark.as_u64());
            }
            WalEvent::Reserve { upper_bound } => info.reserved = Some(upper_bound.as_u64()),
        }
        info
    }
}

/// One batch as printed.
#[derive(Debug, Serialize)]
pub struct BatchInfo {
    /// Offset in the WAL file.
    pub offset: u64,
    /// Framed length in bytes.
    pub len: u64,
    /// Events in logged order.
    pub events: Vec<EventInfo>,
}

/// Runs the dump-wal command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("WAL file not found: {}", path.display()).into());
    }

    let log = FileLog::open(path)?;
    let batches = read_batches(&log, limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&batches)?),
        _ => print_text_output(&batches),
    }

    Ok(())
}

/// Reads up to `limit` batches from the start of the log.
pub fn read_batches(
    log: &dyn LogBackend,
    limit: Option<usize>,
) -> Result<Vec<BatchInfo>, Box<dyn std::error::Error>> {
    let max_batches = limit.unwrap_or(usize::MAX);
    let mut reader = WalReader::new(log)?;
    let mut batches = Vec::new();

    while batches.len() < max_batches {
        let Some(batch) = reader.next() else {
            break;
        };
        let batch = batch?;
        batches.push(BatchInfo {
            offset: batch.offset,
            len: batch.len,
            events: batch.events.iter().map(EventInfo::from).collect(),
        });
    }

    if reader.truncated_tail() {
        tracing::warn!(
            valid_len = reader.valid_len(),
            log_len = reader.log_len(),
            "log ends with an incomplete batch"
        );
    }
    Ok(batches)
}

fn print_text_output(batches: &[BatchInfo]) {
    let events: usize = batches.iter().map(|b| b.events.len()).sum();
    println!("WAL Batches ({} batches, {} events)", batches.len(), events);
    println!("================");
    println!();

    for batch in batches {
        println!("[{:08}] batch len={}", batch.offset, batch.len);
        for event in &batch.events {
            print!("    {:14}", event.op);
            if let Some(ts) = event.start_ts {
                print!(" start={ts}");
            }
            if let Some(ts) = event.commit_ts {
                print!(" commit={ts}");
            }
            if let Some(ts) = event.low_watermark {
                print!(" lwm={ts}");
            }
            if let Some(ts) = event.reserved {
                print!(" upto={ts}");
            }
            println!();
        }
    }
}
