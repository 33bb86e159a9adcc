// End-to-end behaviour of the segmented log through the public API.

use keylog_core::index::KeyValueIndex;
use keylog_core::wal::{SegmentEntry, SegmentManager, SegmentName, Wal, WalConfig};
use keylog_core::{Db, DbConfig};
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn replay(wal: &Wal) -> BTreeMap<String, String> {
    let index = KeyValueIndex::new();
    wal.recover()
        .unwrap()
        .replay(|entry| index.apply(entry))
        .unwrap();
    index.snapshot()
}

// =============================================================================
// Appended entries read back unchanged
// =============================================================================
#[test]
fn appended_entries_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let wal = Wal::open(WalConfig::with_dir(dir.path())).unwrap();

    let written = vec![
        SegmentEntry::put("user", "alice"),
        SegmentEntry::put("empty", ""),
        SegmentEntry::tombstone("user"),
    ];
    for entry in &written {
        wal.append(entry).unwrap();
    }
    wal.close().unwrap();

    let manager = SegmentManager::new(dir.path()).unwrap();
    let read: Vec<SegmentEntry> = manager
        .get_segment(&SegmentName::plain(1))
        .unwrap()
        .into_entries()
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(read, written);
}

// =============================================================================
// Compaction output holds exactly the surviving keys
// =============================================================================
#[test]
fn merge_keeps_only_live_keys() {
    let dir = tempfile::tempdir().unwrap();
    let wal = Wal::open(WalConfig::with_dir(dir.path())).unwrap();

    wal.append(&SegmentEntry::put("x", "1")).unwrap();
    wal.append(&SegmentEntry::put("y", "2")).unwrap();
    wal.rotate().unwrap();
    wal.append(&SegmentEntry::tombstone("x")).unwrap();
    wal.append(&SegmentEntry::put("z", "3")).unwrap();
    wal.rotate().unwrap();

    wal.compact().unwrap().unwrap();

    let names = wal.manager().list_segment_names();
    assert!(!names.contains(&"000001.log".to_string()));
    assert!(!names.contains(&"000002.log".to_string()));
    let compacted: Vec<_> = names.iter().filter(|n| n.starts_with("compacted_")).collect();
    assert_eq!(compacted, vec!["compacted_1_2.log"]);

    let content = fs::read_to_string(dir.path().join("compacted_1_2.log")).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    lines.sort();
    assert_eq!(lines, vec!["y,2,false", "z,3,false"]);

    let state = replay(&wal);
    assert_eq!(state.len(), 2);
    assert!(!state.contains_key("x"));
}

// =============================================================================
// Replay after a crash in the middle of an append
// =============================================================================
#[test]
fn crash_mid_append_loses_only_the_torn_record() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Db::open(DbConfig::with_dir(dir.path())).unwrap();
        db.set("a", "1").unwrap();
        db.set("b", "2").unwrap();
        db.close().unwrap();
    }

    // simulate a torn write
    let path = dir.path().join("000001.log");
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str("c,3,fa");
    fs::write(&path, content).unwrap();

    let db = Db::open(DbConfig::with_dir(dir.path())).unwrap();
    assert_eq!(db.get("a"), Some("1".to_string()));
    assert_eq!(db.get("b"), Some("2".to_string()));
    assert_eq!(db.get("c"), None);

    db.set("d", "4").unwrap();
    db.close().unwrap();

    let db = Db::open(DbConfig::with_dir(dir.path())).unwrap();
    assert_eq!(db.get("d"), Some("4".to_string()));
    assert_eq!(db.stats().unwrap().keys, 3);
}

// =============================================================================
// Foreground appends racing with maintenance
// =============================================================================
#[test]
fn concurrent_appends_and_maintenance() {
    let dir = tempfile::tempdir().unwrap();
    let wal = Arc::new(
        Wal::open(WalConfig {
            rotation_threshold: 256,
            compaction_threshold: 512,
            ..WalConfig::with_dir(dir.path())
        })
        .unwrap(),
    );

    let done = Arc::new(AtomicBool::new(false));
    let maintenance = {
        let wal = wal.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut merges = 0;
            while !done.load(Ordering::Relaxed) {
                wal.request_rotation_tick().unwrap();
                if wal.request_compaction_tick().unwrap().is_some() {
                    merges += 1;
                }
            }
            merges
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let wal = wal.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{}-{}", t, i % 10);
                    wal.append(&SegmentEntry::put(key, i.to_string())).unwrap();
                    if i % 25 == 0 {
                        wal.append(&SegmentEntry::tombstone(format!("t{}-gone", t)))
                            .unwrap();
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    maintenance.join().unwrap();

    let state = replay(&wal);
    assert_eq!(state.len(), 40);
    for t in 0..4 {
        for j in 0..10 {
            assert_eq!(state[&format!("t{}-{}", t, j)], (190 + j).to_string());
        }
    }

    // the active segment is always the newest
    let names = wal.segment_names().unwrap();
    assert_eq!(names.last(), Some(&wal.active_segment_name().unwrap()));
}

// =============================================================================
// Replaying twice gives the same state
// =============================================================================
#[test]
fn recovery_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Db::open(DbConfig::with_dir(dir.path())).unwrap();
        for i in 0..300 {
            db.set(&format!("k{}", i % 17), &i.to_string()).unwrap();
            if i % 7 == 0 {
                db.delete(&format!("k{}", i % 11)).unwrap();
            }
        }
        db.wal().compact().unwrap();
        db.close().unwrap();
    }

    let first = Db::open(DbConfig::with_dir(dir.path())).unwrap();
    let first_state: BTreeMap<String, Option<String>> = (0..17)
        .map(|i| format!("k{}", i))
        .map(|k| (k.clone(), first.get(&k)))
        .collect();
    first.close().unwrap();

    let second = Db::open(DbConfig::with_dir(dir.path())).unwrap();
    for (key, value) in &first_state {
        assert_eq!(&second.get(key), value);
    }
}
