//! WAL Replay
//!
//! Rebuilds unflushed state on startup by feeding every logged record
//! back through the store's write path (with further WAL writes
//! suppressed by the caller). Recovery is forgiving: a malformed line is
//! logged and skipped, never fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;

use super::WalOp;

/// Outcome of a replay pass
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Records successfully applied
    pub records_replayed: u64,

    /// Malformed or unrecognized records skipped
    pub records_skipped: u64,
}

/// Replay every record in the log at `path`, applying each through
/// `apply(op, key, value)`.
///
/// A missing file is a fresh database, not an error.
pub fn replay<F>(path: &Path, mut apply: F) -> Result<ReplayReport>
where
    F: FnMut(WalOp, &[u8], &[u8]) -> Result<()>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ReplayReport::default());
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut report = ReplayReport::default();
    let mut line = Vec::new();
    let mut line_num = 0u64;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_num += 1;

        // Strip the terminator; a missing one means the final record was
        // cut short by a crash mid-append.
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }

        // timestamp|op|key|value, at most 4 parts, value may be empty
        let mut parts = line.splitn(4, |&b| b == b'|');
        let (_timestamp, op, key, value) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(ts), Some(op), Some(key), Some(value)) => (ts, op, key, value),
            _ => {
                warn!(line = line_num, "skipping truncated WAL record");
                report.records_skipped += 1;
                continue;
            }
        };

        let op = match op {
            b"SET" => WalOp::Set,
            b"DEL" => WalOp::Del,
            other => {
                warn!(
                    line = line_num,
                    op = %String::from_utf8_lossy(other),
                    "skipping WAL record with unknown operation"
                );
                report.records_skipped += 1;
                continue;
            }
        };

        apply(op, key, value)?;
        report.records_replayed += 1;
    }

    info!(
        replayed = report.records_replayed,
        skipped = report.records_skipped,
        "WAL recovery complete"
    );
    Ok(report)
}
