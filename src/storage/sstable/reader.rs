//! SSTable Reader
//!
//! Opens SSTable files and answers point lookups through an in-memory
//! key → offset index loaded once at open time.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{EmberError, Result};
use crate::memtable::{Entry, Lookup};

use super::{FOOTER_SIZE, MAGIC, VERSION};

/// Parsed trailing footer
#[derive(Debug, Clone, Copy)]
struct Footer {
    index_start_offset: u64,
    num_entries: u32,
}

/// Open SSTable with its index resident in memory.
///
/// Point lookups serialize seek+read on the retained handle behind a
/// lock, so a single reader can be shared across threads.
pub struct SSTableReader {
    file_path: PathBuf,
    file: Mutex<File>,
    index: HashMap<Vec<u8>, u64>,
    footer: Footer,
}

impl SSTableReader {
    /// Open an SSTable for reading.
    ///
    /// Validates the footer (size, magic, version) and loads the entire
    /// index; any disagreement with the format is `CorruptSSTable`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < FOOTER_SIZE {
            return Err(EmberError::corrupt(format!(
                "{}: file too small to contain a footer ({} bytes)",
                path.display(),
                file_size
            )));
        }

        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let mut footer_bytes = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_bytes)?;

        let index_start_offset = u64::from_le_bytes(footer_bytes[0..8].try_into().unwrap());
        let num_entries = u32::from_le_bytes(footer_bytes[8..12].try_into().unwrap());
        let version = u32::from_le_bytes(footer_bytes[12..16].try_into().unwrap());
        let magic = u32::from_le_bytes(footer_bytes[16..20].try_into().unwrap());

        if magic != MAGIC {
            return Err(EmberError::corrupt(format!(
                "{}: bad magic 0x{:08X}",
                path.display(),
                magic
            )));
        }
        if version != VERSION {
            return Err(EmberError::corrupt(format!(
                "{}: unsupported version {}",
                path.display(),
                version
            )));
        }
        if index_start_offset > file_size - FOOTER_SIZE {
            return Err(EmberError::corrupt(format!(
                "{}: index offset {} past end of index region",
                path.display(),
                index_start_offset
            )));
        }

        let footer = Footer {
            index_start_offset,
            num_entries,
        };

        // Load the index: [key_len(4)][key][offset(8)] per entry
        file.seek(SeekFrom::Start(footer.index_start_offset))?;
        let mut reader = BufReader::new(&mut file);
        let mut index = HashMap::with_capacity(footer.num_entries as usize);

        for _ in 0..footer.num_entries {
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let key_len = u32::from_le_bytes(len_bytes) as usize;

            let mut key = vec![0u8; key_len];
            reader.read_exact(&mut key)?;

            let mut offset_bytes = [0u8; 8];
            reader.read_exact(&mut offset_bytes)?;
            let offset = i64::from_le_bytes(offset_bytes);

            index.insert(key, offset as u64);
        }

        Ok(Self {
            file_path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            footer,
        })
    }

    /// Get a live value by key; tombstones and misses both yield None
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.lookup(key)? {
            Some(Lookup::Value(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Probe for a key, distinguishing tombstones from misses.
    ///
    /// Returns `CorruptSSTable` if the entry stored at the indexed offset
    /// disagrees with the requested key.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Lookup>> {
        let offset = match self.index.get(key) {
            Some(&offset) => offset,
            None => return Ok(None),
        };

        let entry = {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            read_entry(&mut *file)?
        };

        if entry.key != key {
            return Err(EmberError::corrupt(format!(
                "{}: index mismatch at offset {}",
                self.file_path.display(),
                offset
            )));
        }

        if entry.deleted {
            Ok(Some(Lookup::Tombstone))
        } else {
            Ok(Some(Lookup::Value(entry.value)))
        }
    }

    /// Materialize every entry in ascending key order (tombstones
    /// included) by scanning the entry region sequentially.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;

        let mut reader = BufReader::new(&mut *file);
        let mut entries = Vec::with_capacity(self.footer.num_entries as usize);
        let mut offset = 0u64;

        while offset < self.footer.index_start_offset {
            let entry = read_entry(&mut reader)?;
            offset += 17 + entry.key.len() as u64 + entry.value.len() as u64;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Number of entries in this SSTable
    pub fn num_entries(&self) -> u32 {
        self.footer.num_entries
    }

    /// Check if a key exists (value or tombstone) without reading it
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Path of the backing file
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Decode one entry from the current position:
/// [key_len(4)][key][val_len(4)][value][timestamp(8)][deleted(1)]
fn read_entry<R: Read>(reader: &mut R) -> Result<Entry> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let key_len = u32::from_le_bytes(len_bytes) as usize;

    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;

    reader.read_exact(&mut len_bytes)?;
    let value_len = u32::from_le_bytes(len_bytes) as usize;

    let mut value = vec![0u8; value_len];
    reader.read_exact(&mut value)?;

    let mut ts_bytes = [0u8; 8];
    reader.read_exact(&mut ts_bytes)?;
    let timestamp = i64::from_le_bytes(ts_bytes);

    let mut deleted = [0u8; 1];
    reader.read_exact(&mut deleted)?;

    Ok(Entry {
        key,
        value,
        timestamp,
        deleted: deleted[0] != 0,
    })
}
