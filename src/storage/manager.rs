//! Storage Manager
//!
//! Owns the live set of SSTables and their on-disk lifecycle.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup (newest first)
//! - Search SSTables newest → oldest for reads
//! - Write new SSTables from MemTable flushes
//! - Decide when the table set needs compaction
//!
//! ## Concurrency
//! - `sstables`: RwLock over the newest-first list (many concurrent
//!   readers, exclusive writer for publish/swap)
//! - `next_sstable_id`: atomic counter
//! - `compaction_running`: guard ensuring at most one merge at a time

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use tracing::{debug, warn};

use crate::error::Result;
use crate::memtable::{Lookup, MemTable};

use super::sstable::{write_sstable, SSTableReader};

/// Filename prefix/extension for SSTable files: `sstable-<id>.db`
const SSTABLE_PREFIX: &str = "sstable-";
const SSTABLE_EXTENSION: &str = "db";

/// A compaction decision made while publishing a flushed table.
///
/// The output id is claimed at decision time so that any table flushed
/// while the merge runs gets a higher id, keeping the id order consistent
/// with recency across restarts.
pub struct CompactionJob {
    /// Snapshot of the tables to merge, newest first
    pub inputs: Vec<Arc<SSTableReader>>,

    /// Id reserved for the merged output
    pub output_id: u64,
}

/// Manages the on-disk storage layer
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<Arc<SSTableReader>>>,

    /// Next id for creating new SSTables
    next_sstable_id: AtomicU64,

    /// Set while a compaction is in flight
    compaction_running: AtomicBool,
}

impl StorageManager {
    /// Open or create storage in the given directory.
    ///
    /// Enumerates `sstable-<id>.db` files (the id sequence may have holes
    /// left by past compactions), opens each, and orders them newest
    /// first. A corrupt table aborts startup; silently skipping one would
    /// serve stale data.
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut ids: Vec<u64> = Vec::new();
        for dir_entry in fs::read_dir(path)? {
            let file_path = dir_entry?.path();
            if file_path.is_file() {
                if let Some(id) = parse_sstable_id(&file_path) {
                    ids.push(id);
                }
            }
        }

        // Newest first: flushes prepend at runtime, so load must order by
        // descending id to give reads the same priority.
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(ids.len());
        for &id in &ids {
            let sstable_path = sstable_path_in(path, id);
            let reader = SSTableReader::open(&sstable_path)?;
            sstables.push(Arc::new(reader));
        }

        let next_id = ids.first().map(|&id| id + 1).unwrap_or(0);
        debug!(count = sstables.len(), next_id, "loaded sstables");

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            compaction_running: AtomicBool::new(false),
        })
    }

    /// Probe all SSTables newest → oldest, stopping at the first value or
    /// tombstone.
    ///
    /// A read error against one table is logged and the search continues
    /// with the next; availability wins over strictness here.
    pub fn lookup(&self, key: &[u8]) -> Option<Lookup> {
        let sstables = self.sstables.read();
        for reader in sstables.iter() {
            match reader.lookup(key) {
                Ok(Some(hit)) => return Some(hit),
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        path = %reader.file_path().display(),
                        error = %e,
                        "sstable read failed, continuing with older tables"
                    );
                    continue;
                }
            }
        }
        None
    }

    /// Write a sealed MemTable out as a new SSTable and open a reader for
    /// it. The new table is not yet visible; `publish` makes it so.
    pub fn flush(&self, memtable: &MemTable) -> Result<Arc<SSTableReader>> {
        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        // write_sstable rejects an empty snapshot with EmptyFlush and
        // removes the partial file on error.
        write_sstable(&path, &memtable.snapshot())?;

        let reader = SSTableReader::open(&path)?;
        debug!(path = %path.display(), entries = reader.num_entries(), "flushed memtable");
        Ok(Arc::new(reader))
    }

    /// Make a flushed table visible at the front of the list and decide,
    /// under the same exclusive lock, whether the set now needs
    /// compaction.
    ///
    /// At most one compaction runs at a time; the returned job (if any)
    /// carries a snapshot of the whole current list.
    pub fn publish(&self, reader: Arc<SSTableReader>, compaction_threshold: usize) -> Option<CompactionJob> {
        let mut sstables = self.sstables.write();
        sstables.insert(0, reader);

        if sstables.len() < compaction_threshold {
            return None;
        }
        if self.compaction_running.swap(true, Ordering::SeqCst) {
            return None;
        }

        Some(CompactionJob {
            inputs: sstables.clone(),
            output_id: self.next_sstable_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    /// Swap a finished compaction into the list: the inputs disappear,
    /// the merged table (if the merge produced one) takes their place at
    /// the back, and the input files are unlinked.
    ///
    /// Tables flushed while the merge ran sit in front of the inputs and
    /// are untouched.
    pub fn swap_compacted(
        &self,
        inputs: &[Arc<SSTableReader>],
        merged: Option<Arc<SSTableReader>>,
    ) {
        let removed: Vec<Arc<SSTableReader>> = {
            let mut sstables = self.sstables.write();
            let mut removed = Vec::with_capacity(inputs.len());
            sstables.retain(|table| {
                if inputs.iter().any(|input| Arc::ptr_eq(input, table)) {
                    removed.push(Arc::clone(table));
                    false
                } else {
                    true
                }
            });
            if let Some(merged) = merged {
                sstables.push(merged);
            }
            removed
        };

        for table in removed {
            let path = table.file_path().to_path_buf();
            drop(table);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to unlink compacted sstable");
            }
        }
    }

    /// Mark the in-flight compaction finished (success or failure)
    pub fn end_compaction(&self) {
        self.compaction_running.store(false, Ordering::SeqCst);
    }

    /// Drop all open readers (coordinator shutdown)
    pub fn close(&self) {
        self.sstables.write().clear();
    }

    /// Get the number of live SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Sum of entry counts across all live SSTables
    pub fn total_entries(&self) -> u64 {
        self.sstables
            .read()
            .iter()
            .map(|table| table.num_entries() as u64)
            .sum()
    }

    /// Get the next SSTable id (for stats/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    /// File path for the SSTable with the given id
    pub fn sstable_path(&self, id: u64) -> PathBuf {
        sstable_path_in(&self.data_dir, id)
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// "sstable-42.db" in `dir`
fn sstable_path_in(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{}.{}", SSTABLE_PREFIX, id, SSTABLE_EXTENSION))
}

/// "sstable-42.db" → Some(42)
fn parse_sstable_id(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != SSTABLE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(SSTABLE_PREFIX)?.parse().ok()
}
