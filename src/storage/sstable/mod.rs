//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format (little-endian throughout)
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Entry Region (offset 0, variable)                       │
//! │   [KeyLen: u32][Key][ValLen: u32][Value]                │
//! │   [Timestamp: i64][Deleted: u8]                         │
//! │   ... repeated, ascending key order, keys unique ...    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Region (variable)                                 │
//! │   [KeyLen: u32][Key][Offset: i64]                       │
//! │   ... one record per entry, same order ...              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (20 bytes, at EOF)                               │
//! │   IndexStart: u64 | NumEntries: u32                     │
//! │   Version: u32    | Magic: u32                          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! The index is separate from the entries so a reader can load a small
//! directory without scanning values; the fixed-size trailing footer
//! makes the file self-describing from its tail.

mod builder;
mod merge;
mod reader;

pub use builder::{write_sstable, SSTableBuilder};
pub use merge::MergeIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder and reader)
// =============================================================================

/// Magic number identifying an SSTable file
pub(crate) const MAGIC: u32 = 0xBABE_CAFE;

/// Current SSTable format version
pub(crate) const VERSION: u32 = 1;

/// Footer size: IndexStart (8) + NumEntries (4) + Version (4) + Magic (4)
pub(crate) const FOOTER_SIZE: u64 = 20;
