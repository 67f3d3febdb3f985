//! Error types for EmberKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using EmberError
pub type Result<T> = std::result::Result<T, EmberError>;

/// Unified error type for EmberKV operations
#[derive(Debug, Error)]
pub enum EmberError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // MemTable Errors
    // -------------------------------------------------------------------------
    #[error("memtable is immutable")]
    MemTableImmutable,

    #[error("memtable is empty, nothing to flush")]
    EmptyFlush,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("corrupt sstable: {reason}")]
    CorruptSSTable { reason: String },

    #[error("rotation timed out, previous flush still in progress")]
    StillFlushing,

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl EmberError {
    /// Shorthand for a CorruptSSTable error
    pub fn corrupt(reason: impl Into<String>) -> Self {
        EmberError::CorruptSSTable {
            reason: reason.into(),
        }
    }
}
