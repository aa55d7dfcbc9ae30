//! Multi-cycle ordering against durable backends.
//!
//! Each cycle opens a fresh backend over the same path, the way a periodic
//! refresh process would, so only persisted state carries over.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use newsline_core::identity::IdentityKey;
use newsline_core::model::{FeedSnapshot, OrderedItem, Published, RawItem};
use newsline_core::ordering::OrderingEngine;
use newsline_core::sequence::{
    FileKv, KvStore, LoadStatus, SEQUENCE_STORAGE_KEY, SequenceStore, SqliteKv,
};
use tempfile::TempDir;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

fn story(cluster: &str, minute: u32) -> RawItem {
    RawItem {
        title: Some(format!("Story {cluster}")),
        cluster_id: Some(cluster.to_string()),
        source: Some("Reuters".to_string()),
        published_utc: Some(Published::Text(format!("2024-01-01T00:{minute:02}:00Z"))),
        ..RawItem::default()
    }
}

fn clusters(ordered: &[OrderedItem]) -> Vec<String> {
    ordered
        .iter()
        .filter_map(|entry| entry.item.cluster_id.clone())
        .collect()
}

fn file_cycle(path: &Path, feed: &[RawItem]) -> Vec<OrderedItem> {
    let store = SequenceStore::new(FileKv::new(path, LOCK_TIMEOUT));
    OrderingEngine::new(store).order(feed)
}

fn sqlite_cycle(path: &Path, feed: &[RawItem]) -> Vec<OrderedItem> {
    let kv = SqliteKv::open(path, LOCK_TIMEOUT).expect("open sqlite state");
    OrderingEngine::new(SequenceStore::new(kv)).order(feed)
}

fn state_paths() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let json = dir.path().join(".newsline").join("sequence.json");
    let db = dir.path().join(".newsline").join("sequence.db");
    (dir, json, db)
}

#[test]
fn file_backend_keeps_order_stable_across_processes() {
    let (_dir, path, _) = state_paths();

    let first = file_cycle(&path, &[story("a", 5), story("b", 4), story("c", 3)]);
    assert_eq!(clusters(&first), vec!["c", "b", "a"]);

    // b gets a newer timestamp, but its first-seen slot does not move.
    let second = file_cycle(&path, &[story("b", 30), story("d", 1), story("a", 5)]);
    assert_eq!(clusters(&second), vec!["d", "b", "a"]);
    assert_eq!(second[0].sequence, 4);

    let third = file_cycle(&path, &[story("b", 30), story("d", 1), story("a", 5)]);
    assert_eq!(second, third);
}

#[test]
fn sqlite_backend_matches_file_backend() {
    let (_dir, json, db) = state_paths();
    let cycles = [
        vec![story("a", 1), story("b", 2)],
        vec![story("c", 3), story("a", 1), story("b", 2)],
        vec![story("b", 9), story("e", 0), story("c", 3)],
    ];

    for feed in &cycles {
        assert_eq!(file_cycle(&json, feed), sqlite_cycle(&db, feed));
    }
}

#[test]
fn unchanged_cycle_leaves_state_file_untouched() {
    let (_dir, path, _) = state_paths();
    let feed = [story("a", 1), story("b", 2)];

    file_cycle(&path, &feed);
    let before = fs::read_to_string(&path).expect("state written");
    let modified = fs::metadata(&path).and_then(|m| m.modified()).expect("mtime");

    thread::sleep(Duration::from_millis(20));
    file_cycle(&path, &feed);
    let after = fs::metadata(&path).and_then(|m| m.modified()).expect("mtime");
    assert_eq!(modified, after);
    assert_eq!(fs::read_to_string(&path).expect("state"), before);
}

#[test]
fn corrupt_state_file_restarts_numbering() {
    let (_dir, path, _) = state_paths();
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "{not json").expect("write garbage");

    let ordered = file_cycle(&path, &[story("a", 1)]);
    assert_eq!(ordered[0].sequence, 1);

    let store = SequenceStore::new(FileKv::new(&path, LOCK_TIMEOUT));
    let (record, status) = store.inspect();
    assert_eq!(status, LoadStatus::Loaded);
    assert_eq!(record.counter, 1);
}

#[test]
fn corrupt_record_value_restarts_numbering() {
    let (_dir, _, db) = state_paths();
    let mut kv = SqliteKv::open(&db, LOCK_TIMEOUT).expect("open");
    kv.set(SEQUENCE_STORAGE_KEY, "{not json").expect("seed garbage");

    let store = SequenceStore::new(kv);
    assert_eq!(store.inspect().1, LoadStatus::Corrupt);

    let mut engine = OrderingEngine::new(store);
    let ordered = engine.order(&[story("x", 1), story("y", 2)]);
    assert_eq!(clusters(&ordered), vec!["y", "x"]);
    assert_eq!(engine.store().inspect().1, LoadStatus::Loaded);
}

#[test]
fn concurrent_file_cycles_do_not_lose_keys() {
    let (_dir, path, _) = state_paths();
    let start = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for round in 0..5 {
                    let cluster = format!("w{worker}-r{round}");
                    file_cycle(&path, &[story(&cluster, 0)]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker");
    }

    let store = SequenceStore::new(FileKv::new(&path, LOCK_TIMEOUT));
    let record = store.load();
    assert_eq!(record.len(), 20);
    assert_eq!(record.counter, 20);
    for worker in 0..4 {
        for round in 0..5 {
            let key = IdentityKey::from(format!("c:w{worker}-r{round}"));
            assert!(record.get(&key).is_some(), "missing {key}");
        }
    }
}

#[test]
fn snapshot_with_envelope_orders_and_caps() {
    let (_dir, path, _) = state_paths();
    let snapshot = FeedSnapshot::from_json(
        r#"{
            "generated_utc": "2024-01-01T01:00:00Z",
            "items": [
                {"title": "Storm Hits Region - Example.com", "cluster_id": "s1",
                 "published_utc": "2024-01-01T00:00:00Z"},
                {"title": "Storm hits region", "cluster_id": "s1",
                 "published_utc": "2024-01-01T00:05:00Z", "source": "News Aggregator"},
                {"title": "Markets rally", "url": "https://m.example.com/Markets/"},
                "not an item",
                {"title": "Quiet day", "url": "https://example.com/quiet", "paywall": null}
            ]
        }"#,
    )
    .expect("valid envelope");
    assert_eq!(snapshot.items.len(), 4);

    let store = SequenceStore::new(FileKv::new(&path, LOCK_TIMEOUT));
    let mut engine = OrderingEngine::new(store).with_max_items(Some(2));
    let feed = engine.order_snapshot(&snapshot);

    assert_eq!(feed.generated_utc, "2024-01-01T01:00:00Z");
    assert_eq!(feed.count, 2);
    let titles: Vec<_> = feed
        .items
        .iter()
        .filter_map(|entry| entry.item.title.as_deref())
        .collect();
    assert_eq!(titles, vec!["Quiet day", "Markets rally"]);
    assert_eq!(engine.store().load().counter, 3);
}
