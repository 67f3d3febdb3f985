//! MemTable implementation
//!
//! BTreeMap-based memtable behind a single RwLock.
//! Uses parking_lot::RwLock which never poisons on panic.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::clock;
use crate::error::{EmberError, Result};

use super::{Entry, Lookup, ENTRY_METADATA_SIZE};

/// Per-key slot; the key itself lives in the map.
#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    timestamp: i64,
    deleted: bool,
}

struct Inner {
    entries: BTreeMap<Vec<u8>, Slot>,
    size_bytes: usize,
    immutable: bool,
}

/// In-memory sorted table for recent writes
pub struct MemTable {
    inner: RwLock<Inner>,
    max_size: usize,
}

impl MemTable {
    /// Create a new empty MemTable with the given byte budget
    pub fn new(max_size: usize) -> Self {
        MemTable {
            inner: RwLock::new(Inner {
                entries: BTreeMap::new(),
                size_bytes: 0,
                immutable: false,
            }),
            max_size,
        }
    }

    /// Insert or update a key-value pair.
    ///
    /// Updating an existing key overwrites the value in place, bumps the
    /// timestamp and clears any tombstone. Fails with `MemTableImmutable`
    /// once the table has been sealed.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.immutable {
            return Err(EmberError::MemTableImmutable);
        }

        if let Some(slot) = inner.entries.get_mut(key) {
            let old_len = slot.value.len();
            slot.value = value.to_vec();
            slot.timestamp = clock::next_timestamp();
            slot.deleted = false;
            inner.size_bytes = inner.size_bytes + value.len() - old_len;
            return Ok(());
        }

        inner.entries.insert(
            key.to_vec(),
            Slot {
                value: value.to_vec(),
                timestamp: clock::next_timestamp(),
                deleted: false,
            },
        );
        inner.size_bytes += key.len() + value.len() + ENTRY_METADATA_SIZE;
        Ok(())
    }

    /// Mark a key as deleted.
    ///
    /// An existing entry becomes a tombstone (value left in place, never
    /// consulted again); a missing key gets a fresh tombstone entry so the
    /// deletion shadows older SSTables.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.immutable {
            return Err(EmberError::MemTableImmutable);
        }

        if let Some(slot) = inner.entries.get_mut(key) {
            slot.timestamp = clock::next_timestamp();
            slot.deleted = true;
            return Ok(());
        }

        inner.entries.insert(
            key.to_vec(),
            Slot {
                value: Vec::new(),
                timestamp: clock::next_timestamp(),
                deleted: true,
            },
        );
        inner.size_bytes += key.len() + ENTRY_METADATA_SIZE;
        Ok(())
    }

    /// Get a live value by key; tombstones and misses both yield None
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.lookup(key) {
            Some(Lookup::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Probe for a key, distinguishing tombstones from misses
    pub fn lookup(&self, key: &[u8]) -> Option<Lookup> {
        let inner = self.inner.read();
        inner.entries.get(key).map(|slot| {
            if slot.deleted {
                Lookup::Tombstone
            } else {
                Lookup::Value(slot.value.clone())
            }
        })
    }

    /// True once the table has reached its byte budget
    pub fn should_flush(&self) -> bool {
        let inner = self.inner.read();
        inner.size_bytes >= self.max_size
    }

    /// Seal the table; all subsequent mutations fail
    pub fn make_immutable(&self) {
        self.inner.write().immutable = true;
    }

    /// Whether the table is sealed
    pub fn is_immutable(&self) -> bool {
        self.inner.read().immutable
    }

    /// Snapshot of all entries in ascending key order (tombstones included)
    pub fn snapshot(&self) -> Vec<Entry> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .map(|(key, slot)| Entry {
                key: key.clone(),
                value: slot.value.clone(),
                timestamp: slot.timestamp,
                deleted: slot.deleted,
            })
            .collect()
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.inner.read().size_bytes
    }

    /// Number of entries (tombstones included)
    pub fn count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
