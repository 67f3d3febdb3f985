//! Compaction Tests
//!
//! Storage-level tests for the k-way merge: newest-wins selection,
//! tombstone elimination, empty-output handling and visibility
//! preservation.

use std::path::Path;
use std::sync::Arc;

use emberkv::memtable::Entry;
use emberkv::storage::compaction::{compact_sstables, merge_sstables};
use emberkv::storage::sstable::{write_sstable, SSTableReader};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn entry(key: &str, value: &str, timestamp: i64, deleted: bool) -> Entry {
    Entry {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
        timestamp,
        deleted,
    }
}

fn make_table(dir: &Path, name: &str, entries: &[Entry]) -> Arc<SSTableReader> {
    let path = dir.join(name);
    write_sstable(&path, entries).unwrap();
    Arc::new(SSTableReader::open(&path).unwrap())
}

// =============================================================================
// Merge Semantics
// =============================================================================

#[test]
fn test_merge_unions_disjoint_tables() {
    let temp = TempDir::new().unwrap();

    let newer = make_table(
        temp.path(),
        "sstable-1.db",
        &[entry("a", "1", 10, false), entry("c", "3", 10, false)],
    );
    let older = make_table(
        temp.path(),
        "sstable-0.db",
        &[entry("b", "2", 5, false), entry("d", "4", 5, false)],
    );

    let merged = merge_sstables(&[newer, older]).unwrap();

    let keys: Vec<Vec<u8>> = merged.iter().map(|e| e.key.clone()).collect();
    assert_eq!(
        keys,
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
    );
}

#[test]
fn test_merge_newest_timestamp_wins() {
    let temp = TempDir::new().unwrap();

    let newer = make_table(
        temp.path(),
        "sstable-1.db",
        &[entry("k", "new", 20, false)],
    );
    let older = make_table(
        temp.path(),
        "sstable-0.db",
        &[entry("k", "old", 10, false)],
    );

    let merged = merge_sstables(&[newer, older]).unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].value, b"new");
}

#[test]
fn test_merge_drops_tombstoned_keys() {
    let temp = TempDir::new().unwrap();

    let newer = make_table(
        temp.path(),
        "sstable-1.db",
        &[entry("dead", "", 20, true), entry("live", "v", 20, false)],
    );
    let older = make_table(
        temp.path(),
        "sstable-0.db",
        &[entry("dead", "stale", 10, false)],
    );

    let merged = merge_sstables(&[newer, older]).unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].key, b"live");
}

#[test]
fn test_merge_keeps_value_written_after_delete() {
    let temp = TempDir::new().unwrap();

    // delete at t=20, re-set at t=30: the live value is newest
    let newer = make_table(
        temp.path(),
        "sstable-1.db",
        &[entry("k", "reborn", 30, false)],
    );
    let older = make_table(temp.path(), "sstable-0.db", &[entry("k", "", 20, true)]);

    let merged = merge_sstables(&[newer, older]).unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].value, b"reborn");
}

// =============================================================================
// Compaction Output
// =============================================================================

#[test]
fn test_compact_writes_merged_table() {
    let temp = TempDir::new().unwrap();

    let inputs = vec![
        make_table(
            temp.path(),
            "sstable-2.db",
            &[entry("a", "a2", 30, false), entry("b", "b2", 30, false)],
        ),
        make_table(
            temp.path(),
            "sstable-1.db",
            &[entry("a", "a1", 20, false), entry("c", "c1", 20, false)],
        ),
        make_table(
            temp.path(),
            "sstable-0.db",
            &[entry("c", "c0", 10, false), entry("d", "d0", 10, false)],
        ),
    ];

    let output_path = temp.path().join("sstable-3.db");
    let compacted = compact_sstables(&inputs, &output_path).unwrap().unwrap();

    assert_eq!(compacted.num_entries(), 4);
    assert_eq!(compacted.get(b"a").unwrap(), Some(b"a2".to_vec()));
    assert_eq!(compacted.get(b"b").unwrap(), Some(b"b2".to_vec()));
    assert_eq!(compacted.get(b"c").unwrap(), Some(b"c1".to_vec()));
    assert_eq!(compacted.get(b"d").unwrap(), Some(b"d0".to_vec()));
}

#[test]
fn test_compact_all_tombstones_produces_no_output() {
    let temp = TempDir::new().unwrap();

    let inputs = vec![
        make_table(temp.path(), "sstable-1.db", &[entry("a", "", 20, true)]),
        make_table(temp.path(), "sstable-0.db", &[entry("a", "v", 10, false)]),
    ];

    let output_path = temp.path().join("sstable-2.db");
    let compacted = compact_sstables(&inputs, &output_path).unwrap();

    assert!(compacted.is_none());
    assert!(!output_path.exists());
}

#[test]
fn test_compact_single_table_round_trips() {
    let temp = TempDir::new().unwrap();

    let only = make_table(
        temp.path(),
        "sstable-0.db",
        &[entry("x", "1", 1, false), entry("y", "2", 2, false)],
    );

    let output_path = temp.path().join("sstable-1.db");
    let compacted = compact_sstables(&[only], &output_path).unwrap().unwrap();

    assert_eq!(compacted.num_entries(), 2);
    assert_eq!(compacted.get(b"x").unwrap(), Some(b"1".to_vec()));
    assert_eq!(compacted.get(b"y").unwrap(), Some(b"2".to_vec()));
}

// =============================================================================
// Visibility Preservation
// =============================================================================

#[test]
fn test_compaction_preserves_per_key_visibility() {
    let temp = TempDir::new().unwrap();

    // Shadowing chain across three tables for a spread of keys
    let tables = vec![
        make_table(
            temp.path(),
            "sstable-2.db",
            &[
                entry("k0", "newest", 30, false),
                entry("k2", "", 30, true),
                entry("k4", "only-newest", 30, false),
            ],
        ),
        make_table(
            temp.path(),
            "sstable-1.db",
            &[
                entry("k0", "mid", 20, false),
                entry("k1", "mid", 20, false),
                entry("k2", "mid", 20, false),
            ],
        ),
        make_table(
            temp.path(),
            "sstable-0.db",
            &[
                entry("k1", "oldest", 10, false),
                entry("k3", "only-oldest", 10, false),
            ],
        ),
    ];

    // Pre-compaction truth, computed by shadowed lookup newest → oldest
    let keys = ["k0", "k1", "k2", "k3", "k4", "k5"];
    let mut before = Vec::new();
    for key in &keys {
        let mut hit = None;
        for table in &tables {
            if let Some(lookup) = table.lookup(key.as_bytes()).unwrap() {
                hit = Some(lookup);
                break;
            }
        }
        before.push(match hit {
            Some(emberkv::memtable::Lookup::Value(v)) => Some(v),
            _ => None,
        });
    }

    let output_path = temp.path().join("sstable-3.db");
    let compacted = compact_sstables(&tables, &output_path).unwrap().unwrap();

    for (key, expected) in keys.iter().zip(before) {
        assert_eq!(
            compacted.get(key.as_bytes()).unwrap(),
            expected,
            "visibility changed for {}",
            key
        );
    }
}
