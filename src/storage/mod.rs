//! Storage Module
//!
//! The on-disk half of the engine: SSTable format, the manager that owns
//! the live set of tables, and compaction.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge the table set down when it grows past the threshold

pub mod compaction;
mod manager;
pub mod sstable;

pub use manager::{CompactionJob, StorageManager};
pub use sstable::{SSTableBuilder, SSTableReader};
