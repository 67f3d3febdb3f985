//! Compaction
//!
//! Merges the whole SSTable set into a single table: for every key the
//! newest version wins, and keys whose newest version is a tombstone are
//! dropped outright. Dropping is safe precisely because the merge always
//! consumes the entire list, so no older table can resurrect the key.
//! (A tiered or leveled scheme would have to retain tombstones until the
//! lowest level.)

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::memtable::Entry;

use super::sstable::{write_sstable, MergeIterator, SSTableReader};

/// Merge `inputs` (newest first) into the deduplicated union with
/// tombstones eliminated.
pub fn merge_sstables(inputs: &[Arc<SSTableReader>]) -> Result<Vec<Entry>> {
    let mut sources = Vec::with_capacity(inputs.len());
    for reader in inputs {
        sources.push(reader.entries()?);
    }

    Ok(MergeIterator::new(sources)
        .filter(|entry| !entry.deleted)
        .collect())
}

/// Compact `inputs` (newest first) into a new SSTable at `output_path`.
///
/// Returns the opened output table, or `None` when every surviving key
/// was tombstoned and there is nothing to write. On failure the partial
/// output is removed and the inputs are untouched.
pub fn compact_sstables(
    inputs: &[Arc<SSTableReader>],
    output_path: &Path,
) -> Result<Option<SSTableReader>> {
    let input_entries: u64 = inputs.iter().map(|r| r.num_entries() as u64).sum();
    let merged = merge_sstables(inputs)?;

    if merged.is_empty() {
        info!(
            inputs = inputs.len(),
            "compaction eliminated every key, no output table"
        );
        return Ok(None);
    }

    // write_sstable fsyncs before returning and unlinks on failure
    write_sstable(output_path, &merged)?;
    let reader = SSTableReader::open(output_path)?;

    info!(
        inputs = inputs.len(),
        input_entries,
        output_entries = reader.num_entries(),
        output = %output_path.display(),
        "compaction complete"
    );
    Ok(Some(reader))
}
