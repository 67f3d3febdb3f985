//! WAL Tests
//!
//! Tests verify:
//! - Record format (timestamp|op|key|value per line)
//! - Append + replay round trips
//! - Missing-file and malformed-record handling during replay
//! - Truncation

use std::path::PathBuf;

use emberkv::wal::{replay, WalOp, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("wal.log");
    (temp_dir, wal_path)
}

/// Collect replayed records as (op, key, value) tuples
fn collect_records(path: &PathBuf) -> Vec<(WalOp, Vec<u8>, Vec<u8>)> {
    let mut records = Vec::new();
    replay(path, |op, key, value| {
        records.push((op, key.to_vec(), value.to_vec()));
        Ok(())
    })
    .unwrap();
    records
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_creates_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path).unwrap();
    writer.append(WalOp::Set, b"key1", b"value1").unwrap();

    assert!(wal_path.exists());
    assert!(std::fs::metadata(&wal_path).unwrap().len() > 0);
}

#[test]
fn test_record_format() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(WalOp::Set, b"mykey", b"myvalue").unwrap();
        writer.append(WalOp::Del, b"mykey", b"").unwrap();
    }

    let contents = std::fs::read_to_string(&wal_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);

    let set_parts: Vec<&str> = lines[0].splitn(4, '|').collect();
    assert_eq!(set_parts.len(), 4);
    assert!(set_parts[0].parse::<i64>().is_ok()); // unix seconds
    assert_eq!(set_parts[1], "SET");
    assert_eq!(set_parts[2], "mykey");
    assert_eq!(set_parts[3], "myvalue");

    let del_parts: Vec<&str> = lines[1].splitn(4, '|').collect();
    assert_eq!(del_parts[1], "DEL");
    assert_eq!(del_parts[2], "mykey");
    assert_eq!(del_parts[3], ""); // DEL carries an empty value
}

#[test]
fn test_append_survives_reopen() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(WalOp::Set, b"first", b"1").unwrap();
    }
    {
        // Reopen must append, not truncate
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(WalOp::Set, b"second", b"2").unwrap();
    }

    let records = collect_records(&wal_path);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].1, b"first");
    assert_eq!(records[1].1, b"second");
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_missing_file_is_empty() {
    let (_temp, wal_path) = setup_temp_wal();

    let report = replay(&wal_path, |_, _, _| panic!("nothing to apply")).unwrap();
    assert_eq!(report.records_replayed, 0);
    assert_eq!(report.records_skipped, 0);
}

#[test]
fn test_replay_round_trip() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(WalOp::Set, b"a", b"1").unwrap();
        writer.append(WalOp::Set, b"b", b"2").unwrap();
        writer.append(WalOp::Del, b"a", b"").unwrap();
    }

    let records = collect_records(&wal_path);
    assert_eq!(
        records,
        vec![
            (WalOp::Set, b"a".to_vec(), b"1".to_vec()),
            (WalOp::Set, b"b".to_vec(), b"2".to_vec()),
            (WalOp::Del, b"a".to_vec(), b"".to_vec()),
        ]
    );
}

#[test]
fn test_replay_skips_malformed_lines() {
    let (_temp, wal_path) = setup_temp_wal();

    // Two good records around a truncated one and an unknown op
    std::fs::write(
        &wal_path,
        "1700000000|SET|good1|v1\n1700000000|SET\n1700000000|NOP|x|y\n1700000000|SET|good2|v2\n",
    )
    .unwrap();

    let mut records = Vec::new();
    let report = replay(&wal_path, |op, key, value| {
        records.push((op, key.to_vec(), value.to_vec()));
        Ok(())
    })
    .unwrap();

    assert_eq!(report.records_replayed, 2);
    assert_eq!(report.records_skipped, 2);
    assert_eq!(records[0].1, b"good1");
    assert_eq!(records[1].1, b"good2");
}

#[test]
fn test_replay_tolerates_missing_final_newline() {
    let (_temp, wal_path) = setup_temp_wal();

    // Crash mid-append: last line has no terminator but is complete
    std::fs::write(&wal_path, "1700000000|SET|k|v\n1700000001|SET|k2|v2").unwrap();

    let records = collect_records(&wal_path);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].1, b"k2");
    assert_eq!(records[1].2, b"v2");
}

#[test]
fn test_replay_empty_value_set() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(WalOp::Set, b"key", b"").unwrap();
    }

    let records = collect_records(&wal_path);
    assert_eq!(records, vec![(WalOp::Set, b"key".to_vec(), b"".to_vec())]);
}

#[test]
fn test_replay_many_records() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        for i in 0..1000 {
            writer
                .append(
                    WalOp::Set,
                    format!("key{}", i).as_bytes(),
                    format!("value{}", i).as_bytes(),
                )
                .unwrap();
        }
    }

    let report = replay(&wal_path, |_, _, _| Ok(())).unwrap();
    assert_eq!(report.records_replayed, 1000);
}

// =============================================================================
// Truncate Tests
// =============================================================================

#[test]
fn test_truncate_clears_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path).unwrap();
    writer.append(WalOp::Set, b"k1", b"v1").unwrap();
    writer.append(WalOp::Set, b"k2", b"v2").unwrap();
    writer.truncate().unwrap();

    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);

    let report = replay(&wal_path, |_, _, _| panic!("log should be empty")).unwrap();
    assert_eq!(report.records_replayed, 0);
}

#[test]
fn test_truncate_then_append() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(WalOp::Set, b"old", b"data").unwrap();
        writer.truncate().unwrap();
        writer.append(WalOp::Set, b"new", b"data").unwrap();
    }

    let records = collect_records(&wal_path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].1, b"new");
}
