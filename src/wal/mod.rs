//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging. Every
//! write hits the WAL (and disk, via fsync) before it becomes visible in
//! the memtable; startup replays the log to rebuild unflushed state.
//!
//! ## File Format
//! One record per line, `|`-delimited:
//! ```text
//! <unix_seconds>|SET|<key>|<value>\n
//! <unix_seconds>|DEL|<key>|\n
//! ```
//! Keys and values must not contain `|`, `\r` or `\n`; the engine rejects
//! such inputs before they reach the log.

mod replay;
mod writer;

pub use replay::{replay, ReplayReport};
pub use writer::WalWriter;

/// Operations that can be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    Set,
    Del,
}

impl WalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalOp::Set => "SET",
            WalOp::Del => "DEL",
        }
    }
}
