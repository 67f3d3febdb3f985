//! SSTable Builder
//!
//! Writes a sorted entry sequence to a new SSTable file in one pass:
//! entries, then the index, then the footer, then fsync.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{EmberError, Result};
use crate::memtable::Entry;

use super::{FOOTER_SIZE, MAGIC, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Byte offset the next entry will land at (0-based from file start)
    current_offset: u64,
    /// Index under construction: key → entry offset
    index: Vec<(Vec<u8>, u64)>,
}

impl SSTableBuilder {
    /// Create a new builder writing to `path` (truncates any existing file)
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            current_offset: 0,
            index: Vec::new(),
        })
    }

    /// Append one entry; callers must add entries in ascending key order
    /// with no duplicate keys.
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        debug_assert!(
            self.index
                .last()
                .map(|(last, _)| last.as_slice() < entry.key.as_slice())
                .unwrap_or(true),
            "entries must be added in strictly ascending key order"
        );

        self.index.push((entry.key.clone(), self.current_offset));

        self.writer
            .write_all(&(entry.key.len() as u32).to_le_bytes())?;
        self.writer.write_all(&entry.key)?;
        self.writer
            .write_all(&(entry.value.len() as u32).to_le_bytes())?;
        self.writer.write_all(&entry.value)?;
        self.writer.write_all(&entry.timestamp.to_le_bytes())?;
        self.writer.write_all(&[entry.deleted as u8])?;

        // 4 + key + 4 + value + 8 + 1
        self.current_offset += 17 + entry.key.len() as u64 + entry.value.len() as u64;
        Ok(())
    }

    /// Write the index and footer, then fsync.
    ///
    /// An empty builder is rejected with `EmptyFlush`; the caller removes
    /// the partial file on any failure.
    pub fn finish(mut self) -> Result<PathBuf> {
        if self.index.is_empty() {
            return Err(EmberError::EmptyFlush);
        }

        let index_start_offset = self.current_offset;
        let num_entries = self.index.len() as u32;

        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(key)?;
            self.writer.write_all(&(*offset as i64).to_le_bytes())?;
        }

        // Fixed 20-byte footer
        debug_assert_eq!(FOOTER_SIZE, 8 + 4 + 4 + 4);
        self.writer.write_all(&index_start_offset.to_le_bytes())?;
        self.writer.write_all(&num_entries.to_le_bytes())?;
        self.writer.write_all(&VERSION.to_le_bytes())?;
        self.writer.write_all(&MAGIC.to_le_bytes())?;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        Ok(self.path)
    }
}

/// Serialize a sorted, deduplicated entry sequence to `path`.
///
/// Convenience wrapper used by flush and compaction; the partial file is
/// removed before the error propagates.
pub fn write_sstable(path: &Path, entries: &[Entry]) -> Result<()> {
    if entries.is_empty() {
        return Err(EmberError::EmptyFlush);
    }

    let result = (|| {
        let mut builder = SSTableBuilder::new(path)?;
        for entry in entries {
            builder.add(entry)?;
        }
        builder.finish()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}
