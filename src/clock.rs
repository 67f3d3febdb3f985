//! Process-wide timestamp source
//!
//! Entry timestamps decide which version of a key wins during reads and
//! compaction, so they must be totally ordered: the clock never returns
//! the same value twice and never goes backwards, even when the wall
//! clock does.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Nanoseconds since the Unix epoch, strictly increasing per process.
pub fn next_timestamp() -> i64 {
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = wall_clock_nanos().max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(
            last,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}

/// Seconds since the Unix epoch (WAL record timestamps).
pub fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn wall_clock_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
