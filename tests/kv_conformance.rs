//! Behavioural suite any kv-mem store must pass.
//!
//! Every scenario runs against the same store, one after the other, the way
//! a long-lived consumer would use it: scenarios clean up after themselves
//! and must not depend on the index values left behind by earlier ones.

mod common;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use memkv::KvAction;
use memkv::KvFlags;
use memkv::MemKv;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio::time::Instant;

async fn get(kv: &MemKv) {
    assert!(kv.get("DEADCAFE").unwrap_err().is_not_found());

    let key = "foo/docker";
    kv.put(key, "great", 10).unwrap();

    let entry = kv.get(key).unwrap();
    assert_eq!(entry.key, key);
    assert_eq!(entry.value, b"great");

    kv.delete(key).unwrap();
}

async fn get_value(kv: &MemKv) {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        n: i32,
        s: String,
    }

    let expected = Sample {
        n: 10,
        s: "Ten".to_string(),
    };

    let key = "DEADBEEF";
    let _ = kv.delete(key);
    kv.put_value(key, &expected, 0).unwrap();

    let (_, actual): (_, Sample) = kv.get_value(key).unwrap();
    assert_eq!(actual, expected);

    kv.delete(key).unwrap();
}

async fn create(kv: &MemKv) {
    let key = "create/foo";
    let _ = kv.delete(key);

    let entry = kv.create(key, "bar", 0).unwrap();
    assert_eq!(entry.action, KvAction::Create);

    assert!(kv.create(key, "bar", 0).unwrap_err().is_already_exists());

    kv.delete(key).unwrap();
}

async fn update(kv: &MemKv) {
    let key = "update/foo";
    let _ = kv.delete(key);

    assert!(kv.update(key, "bar", 0).unwrap_err().is_not_found());

    kv.create(key, "bar", 0).unwrap();
    let entry = kv.update(key, "bar", 0).unwrap();
    assert_eq!(entry.action, KvAction::Set);

    kv.delete(key).unwrap();
}

async fn delete_key(kv: &MemKv) {
    let key = "delete_key";
    let _ = kv.delete(key);

    kv.put(key, "delete_me", 10).unwrap();
    kv.get(key).unwrap();
    kv.delete(key).unwrap();

    assert!(kv.get(key).unwrap_err().is_not_found());
    assert!(kv.delete(key).unwrap_err().is_not_found());
}

async fn delete_tree(kv: &MemKv) {
    let keys = ["tree/1cbc9a98-072a-4793-8608-01ab43db96c8", "tree/foo"];

    for key in keys {
        kv.put(key, "bar", 10).unwrap();
    }
    for key in keys {
        kv.get(key).unwrap();
    }

    kv.delete_tree("tree").unwrap();

    for key in keys {
        assert!(kv.get(key).unwrap_err().is_not_found());
    }
}

async fn enumerate(kv: &MemKv) {
    let expected: HashMap<&str, &str> = [
        ("enumerate/1cbc9a98-072a-4793-8608-01ab43db96c8", "bar"),
        ("enumerate/foo", "baz"),
    ]
    .into_iter()
    .collect();

    let _ = kv.delete_tree("enumerate");
    for (key, value) in &expected {
        kv.put(key, value, 10).unwrap();
    }

    let entries = kv.enumerate("enumerate").unwrap();
    assert_eq!(entries.len(), expected.len());
    for entry in entries {
        let value = expected
            .get(entry.key.as_str())
            .unwrap_or_else(|| panic!("unexpected entry {}", entry.key));
        assert_eq!(entry.value, value.as_bytes());
    }

    kv.delete_tree("enumerate").unwrap();
}

async fn lock(kv: &MemKv) {
    let key = "locktest";
    let held = kv.lock(key, 10).await.unwrap();

    let mut stash = held.clone();
    stash.value = b"hoohah".to_vec();
    assert!(kv.unlock(&stash).is_err(), "unlock must fail for a forged entry");

    kv.unlock(&held).unwrap();

    let held = kv.lock(key, 3).await.unwrap();
    kv.unlock(&held).unwrap();

    // A second locker only gets through once the holder lets go
    let held = kv.lock(key, 20).await.unwrap();
    let released = Arc::new(AtomicBool::new(false));
    let holder = {
        let kv = kv.clone();
        let released = released.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(10)).await;
            released.store(true, Ordering::SeqCst);
            kv.unlock(&held).unwrap();
        })
    };

    let held = kv.lock(key, 3).await.unwrap();
    assert!(released.load(Ordering::SeqCst), "locked before unlock");
    holder.await.unwrap();
    kv.unlock(&held).unwrap();
}

/// Drives the writes a watcher on `watched` is expected to observe for
/// `key`: a create, `iterations` sets, a delete, and finally a create of the
/// stop value. Each write waits until the previous one has been delivered.
async fn watch_updates(
    kv: &MemKv,
    watched: &str,
    key: &str,
    iterations: usize,
    rx: &mut mpsc::UnboundedReceiver<Delivery>,
) {
    let mut last_index = 0;
    let mut expect = |delivery: Delivery, action: KvAction| match delivery {
        Delivery::Event { key: seen, entry } => {
            assert_eq!(seen, key);
            assert_eq!(entry.key, key);
            assert_eq!(entry.action, action);
            assert!(entry.kvdb_index > last_index, "index must grow");
            assert!(entry.modified_index > last_index, "index must grow");
            last_index = entry.kvdb_index;
        }
        Delivery::Stopped { key } => panic!("watch on {key} stopped early"),
    };

    kv.create(key, "bar", 10).unwrap();
    expect(next_delivery(rx).await, KvAction::Create);

    for _ in 0..iterations {
        kv.put(key, "bar", 10).unwrap();
        expect(next_delivery(rx).await, KvAction::Set);
    }

    kv.delete(key).unwrap();
    expect(next_delivery(rx).await, KvAction::Delete);

    kv.create(key, "stop", 0).unwrap();
    expect(next_delivery(rx).await, KvAction::Create);

    match next_delivery(rx).await {
        Delivery::Stopped { key: stopped } => assert_eq!(stopped, watched),
        other => panic!("expected stop, got {other:?}"),
    }
}

async fn watch_key(kv: &MemKv) {
    let key = "tree/key";
    let _ = kv.delete(key);

    let (tx, mut rx) = mpsc::unbounded_channel();
    kv.watch_key(key, no_opaque(), recording_callback(tx, b"stop"))
        .unwrap();

    watch_updates(kv, key, key, 2, &mut rx).await;
    assert!(rx.recv().await.is_none());

    kv.delete(key).unwrap();
}

async fn watch_tree(kv: &MemKv) {
    let key = "tree/key";
    let _ = kv.delete(key);

    let (tx, mut rx) = mpsc::unbounded_channel();
    kv.watch_tree("tree", no_opaque(), recording_callback(tx, b"stop"))
        .unwrap();

    // Noise outside the watched tree
    let stopped = Arc::new(AtomicBool::new(false));
    let noise = {
        let kv = kv.clone();
        let stopped = stopped.clone();
        tokio::spawn(async move {
            while !stopped.load(Ordering::SeqCst) {
                kv.put("randomKey", "bar", 10).unwrap();
                sleep(Duration::from_millis(80)).await;
            }
        })
    };

    watch_updates(kv, "tree", key, 2, &mut rx).await;
    stopped.store(true, Ordering::SeqCst);
    noise.await.unwrap();

    kv.delete(key).unwrap();
    let _ = kv.delete("randomKey");
}

async fn cas(kv: &MemKv) {
    let key = "foo/docker";
    let value = b"great";

    kv.put(key, value, 10).unwrap();
    let mut entry = kv.get(key).unwrap();

    assert!(kv
        .compare_and_set(&entry, KvFlags::NONE, Some(b"badval".as_slice()))
        .is_err());

    entry.modified_index += 1;
    assert!(kv.compare_and_set(&entry, KvFlags::MODIFIED_INDEX, None).is_err());

    entry.modified_index -= 1;
    let entry = kv.compare_and_set(&entry, KvFlags::MODIFIED_INDEX, None).unwrap();

    let entry = kv
        .compare_and_set(&entry, KvFlags::NONE, Some(value.as_slice()))
        .unwrap();

    kv.compare_and_set(&entry, KvFlags::MODIFIED_INDEX, Some(value.as_slice()))
        .unwrap();

    kv.delete(key).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_full_suite() {
    let kv = new_kv();

    get(&kv).await;
    get_value(&kv).await;
    create(&kv).await;
    update(&kv).await;
    delete_key(&kv).await;
    delete_tree(&kv).await;
    enumerate(&kv).await;
    lock(&kv).await;
    watch_key(&kv).await;
    watch_tree(&kv).await;
    cas(&kv).await;
}

#[tokio::test(start_paused = true)]
async fn test_basic_suite() {
    let kv = new_kv();

    get(&kv).await;
    get_value(&kv).await;
    create(&kv).await;
    update(&kv).await;
    delete_key(&kv).await;
    delete_tree(&kv).await;
    enumerate(&kv).await;

    let held = kv.lock("locktest", 100).await.unwrap();
    kv.unlock(&held).unwrap();
    let held = kv.lock("locktest", 20).await.unwrap();
    kv.unlock(&held).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ttl_entries_disappear() {
    let kv = new_kv();
    let started = Instant::now();

    kv.put("ttl/short", "a", 1).unwrap();
    kv.put("ttl/long", "b", 5).unwrap();
    kv.put("ttl/none", "c", 0).unwrap();

    sleep(Duration::from_secs(2)).await;
    let mut keys: Vec<String> = kv.enumerate("ttl/").unwrap().into_iter().map(|e| e.key).collect();
    keys.sort();
    assert_eq!(keys, vec!["ttl/long".to_string(), "ttl/none".to_string()]);

    sleep(Duration::from_secs(4)).await;
    let keys: Vec<String> = kv.enumerate("ttl/").unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["ttl/none".to_string()]);
    assert!(Instant::now() - started >= Duration::from_secs(5));
}
