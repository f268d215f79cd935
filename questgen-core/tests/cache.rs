use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;

use questgen_core::{context, extract, fingerprint, GenerationCache, ParsedResult};

fn result(title: &str) -> ParsedResult {
    let mut parsed = extract(&json!({ "title": title }).to_string()).unwrap();
    parsed.is_complete = true;
    parsed.quality_score = 0.9;
    parsed
}

#[test]
fn put_then_get_round_trips() {
    let cache = GenerationCache::new(8);
    let fp = fingerprint("quest_outline", &context! { "topic" => "volcanoes" });

    cache.put(fp.clone(), result("Volcano Explorer"), Duration::from_secs(60));

    assert_eq!(cache.get(&fp), Some(result("Volcano Explorer")));
    let entry = cache.entry(&fp).unwrap();
    assert_eq!(entry.fingerprint, fp);
    assert_eq!(entry.ttl, Duration::from_secs(60));
}

#[test]
fn expired_entries_read_as_absent() {
    let cache = GenerationCache::new(8);
    cache.put("short", result("A"), Duration::from_millis(50));
    cache.put("long", result("B"), Duration::from_secs(60));
    assert!(cache.get("short").is_some());

    thread::sleep(Duration::from_millis(150));

    assert_eq!(cache.get("short"), None);
    assert!(cache.get("long").is_some());
}

#[test]
fn collision_overwrites() {
    let cache = GenerationCache::new(8);
    cache.put("fp", result("first"), Duration::from_secs(60));
    cache.put("fp", result("second"), Duration::from_secs(60));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("fp"), Some(result("second")));
}

#[test]
fn overwrite_takes_the_new_ttl() {
    let cache = GenerationCache::new(8);
    cache.put("fp", result("first"), Duration::from_secs(60));
    cache.put("fp", result("second"), Duration::from_millis(50));

    thread::sleep(Duration::from_millis(150));

    assert_eq!(cache.get("fp"), None);
}

#[test]
fn evicts_least_recently_used_when_full() {
    let cache = GenerationCache::new(2);
    cache.put("a", result("A"), Duration::from_secs(60));
    cache.put("b", result("B"), Duration::from_secs(60));
    cache.sweep_expired();
    assert!(cache.get("a").is_some());
    cache.sweep_expired();

    cache.put("c", result("C"), Duration::from_secs(60));
    cache.sweep_expired();

    assert_eq!(cache.len(), 2);
    assert!(cache.get("a").is_some());
    assert!(cache.get("b").is_none());
    assert!(cache.get("c").is_some());
}

#[test]
fn sweep_removes_only_expired() {
    let cache = GenerationCache::new(8);
    cache.put("a", result("A"), Duration::from_millis(50));
    cache.put("b", result("B"), Duration::from_millis(50));
    cache.put("c", result("C"), Duration::from_secs(30));
    thread::sleep(Duration::from_millis(150));

    cache.sweep_expired();

    assert_eq!(cache.len(), 1);
    assert!(cache.get("c").is_some());
}

#[test]
fn remove_and_clear() {
    let cache = GenerationCache::new(8);
    cache.put("a", result("A"), Duration::from_secs(60));
    cache.put("b", result("B"), Duration::from_secs(60));

    assert_eq!(cache.remove("a").map(|entry| entry.fingerprint.clone()), Some("a".to_string()));
    assert_eq!(cache.get("a"), None);

    cache.clear();
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_and_writers() {
    let cache = Arc::new(GenerationCache::new(1_000));
    let tasks: Vec<_> = (0..16)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..50 {
                    let key = format!("{worker}-{i}");
                    cache.put(key.clone(), result(&key), Duration::from_secs(60));
                    assert_eq!(cache.get(&key).map(|r| r.fields["title"].clone()), Some(json!(key)));
                }
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }
    assert_eq!(cache.len(), 800);
}
