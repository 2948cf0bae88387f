// ============================================================================
// Scheduler Integration Tests
// ============================================================================
//
// These tests run against a real Redis instance:
//   docker run -d -p 6379:6379 redis:7
//   cargo test --test scheduler_test -- --ignored
//
// The publisher is a recording stub; no Kafka broker is needed.
//
// ============================================================================

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redrive::dlq::DeadLetterSink;
use redrive::kafka::{RedeliveryPublisher, RetryHeaders};
use redrive::scheduler::RetryScheduler;
use redrive::{RetryEnvelope, RetryOptions};
use redrive_store::RedisStore;
use serde_json::{json, Value};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Published {
    topic: String,
    key: String,
    value: Value,
    headers: RetryHeaders,
}

/// Records every publish instead of talking to a broker.
#[derive(Default)]
struct RecordingPublisher {
    records: Mutex<Vec<Published>>,
}

#[async_trait]
impl RedeliveryPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &RetryHeaders,
    ) -> anyhow::Result<()> {
        self.records.lock().await.push(Published {
            topic: topic.to_string(),
            key: key.to_string(),
            value: serde_json::from_slice(payload)?,
            headers: *headers,
        });
        Ok(())
    }
}

async fn test_store() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisStore::connect(&url).await.expect("Redis connection")
}

fn scheduler_with(
    store: RedisStore,
    publisher: Arc<RecordingPublisher>,
    dead_letter: Option<DeadLetterSink>,
) -> RetryScheduler {
    RetryScheduler::new(store, publisher, dead_letter, Duration::from_secs(60))
}

/// Drop leftover state from previous runs so assertions see only this test.
async fn clear_keys(store: &RedisStore, keys: &[&str]) {
    let mut store = store.clone();
    for key in keys {
        store.del(*key).await.expect("cleanup del");
    }
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_enqueue_writes_wire_shape_and_ttl() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003", "it-token-shape"]).await;

    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = scheduler_with(store.clone(), publisher, None);

    // The worked example: delay=2 at 10:00:30 lands in bucket 20240101-1003
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let bucket = scheduler
        .enqueue_at(
            now,
            "orders",
            "OrderFailed",
            json!({"msgId": "it-token-shape", "success": false}),
            &RetryHeaders {
                delay: 2,
                max_retry: 3,
                retry_count: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(bucket, "20240101-1003");

    let mut store_check = store.clone();
    assert_eq!(store_check.llen(&bucket).await.unwrap(), 1);

    let entries: Vec<String> = store_check.lrange(&bucket, 0, -1).await.unwrap();
    let entry: Value = serde_json::from_str(&entries[0]).unwrap();
    assert_eq!(entry["topic"], json!("orders"));
    assert_eq!(entry["event"], json!("OrderFailed"));
    assert_eq!(entry["value"]["msgId"], json!("it-token-shape"));
    assert_eq!(
        entry["options"],
        json!({
            "delay": "2",
            "maxRetry": "3",
            "retryCount": "1",
            "executeAt": "2024-01-01 10:03:00",
        })
    );

    // TTL = 60 * (delay + 1), counted from the enqueue call
    let ttl = store_check.ttl(&bucket).await.unwrap();
    assert!(ttl > 170 && ttl <= 180, "unexpected bucket TTL: {ttl}");

    // Claim marker registered without expiry
    let marker: Option<String> = store_check.get("it-token-shape").await.unwrap();
    assert_eq!(marker.as_deref(), Some("true"));
    assert_eq!(store_check.ttl("it-token-shape").await.unwrap(), -1);

    clear_keys(&store, &["20240101-1003", "it-token-shape"]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_duplicate_enqueues_accumulate() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003", "it-token-dup"]).await;

    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = scheduler_with(store.clone(), publisher, None);

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let headers = RetryHeaders {
        delay: 2,
        max_retry: 3,
        retry_count: 0,
    };
    let payload = json!({"msgId": "it-token-dup", "success": false});

    scheduler
        .enqueue_at(now, "orders", "OrderFailed", payload.clone(), &headers)
        .await
        .unwrap();
    scheduler
        .enqueue_at(now, "orders", "OrderFailed", payload, &headers)
        .await
        .unwrap();

    let mut store_check = store.clone();
    assert_eq!(store_check.llen("20240101-1003").await.unwrap(), 2);

    // TTL is unchanged by the number of entries already in the bucket
    let ttl = store_check.ttl("20240101-1003").await.unwrap();
    assert!(ttl > 170 && ttl <= 180, "unexpected bucket TTL: {ttl}");

    clear_keys(&store, &["20240101-1003", "it-token-dup"]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_drain_publishes_once_with_fresh_token() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003", "it-token-drain"]).await;

    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = scheduler_with(store.clone(), publisher.clone(), None);

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let bucket = scheduler
        .enqueue_at(
            now,
            "orders",
            "OrderFailed",
            json!({"msgId": "it-token-drain", "success": false}),
            &RetryHeaders {
                delay: 2,
                max_retry: 3,
                retry_count: 1,
            },
        )
        .await
        .unwrap();

    let summary = scheduler.drain_bucket(&bucket).await.unwrap();
    assert_eq!(summary.found, 1);
    assert_eq!(summary.published, 1);
    assert_eq!(summary.dead_lettered, 0);

    let records = publisher.records.lock().await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.topic, "orders");
    assert_eq!(record.key, "OrderFailed");
    assert_eq!(record.headers.retry_count, 2);

    // A fresh token was minted; the rest of the payload is untouched
    let fresh = record.value["msgId"].as_str().unwrap().to_string();
    assert_ne!(fresh, "it-token-drain");
    assert_eq!(record.value["success"], json!(false));
    drop(records);

    // The original claim marker was consumed; the fresh token gets its
    // marker only when the event fails again and is re-enqueued
    let mut store_check = store.clone();
    let old_marker: Option<String> = store_check.get("it-token-drain").await.unwrap();
    assert_eq!(old_marker, None);
    let fresh_marker: Option<String> = store_check.get(&fresh).await.unwrap();
    assert_eq!(fresh_marker, None);

    // The entry was removed from the bucket; draining again finds nothing
    let summary = scheduler.drain_bucket(&bucket).await.unwrap();
    assert_eq!(summary.found, 0);

    clear_keys(&store, &[&bucket]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_concurrent_drains_publish_at_most_once() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003", "it-token-race"]).await;

    // One shared recording publisher, two scheduler instances - the
    // two-process deployment in miniature
    let publisher = Arc::new(RecordingPublisher::default());
    let first = scheduler_with(store.clone(), publisher.clone(), None);
    let second = scheduler_with(store.clone(), publisher.clone(), None);

    // The same logical event enqueued twice: two list entries, one token
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let headers = RetryHeaders {
        delay: 2,
        max_retry: 3,
        retry_count: 1,
    };
    let payload = json!({"msgId": "it-token-race", "success": false});
    let bucket = first
        .enqueue_at(now, "orders", "OrderFailed", payload.clone(), &headers)
        .await
        .unwrap();
    first
        .enqueue_at(now, "orders", "OrderFailed", payload, &headers)
        .await
        .unwrap();

    let (a, b) = tokio::join!(first.drain_bucket(&bucket), second.drain_bucket(&bucket));
    let a = a.unwrap();
    let b = b.unwrap();

    // Both entries were drained somewhere, but the claim admits one publish
    assert_eq!(a.found + b.found, 2);
    assert_eq!(a.published + b.published, 1);
    assert_eq!(a.claims_lost + b.claims_lost, 1);
    assert_eq!(publisher.records.lock().await.len(), 1);

    clear_keys(&store, &[&bucket]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_exhausted_entry_escalates_to_dead_letter() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003", "it-token-dlq", "it:dead-letter"]).await;

    let publisher = Arc::new(RecordingPublisher::default());
    let sink = DeadLetterSink::new(store.clone(), "it:dead-letter");
    let scheduler = scheduler_with(store.clone(), publisher.clone(), Some(sink));

    // retryCount 3 increments to 4 on enqueue, exceeding maxRetry 3
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let bucket = scheduler
        .enqueue_at(
            now,
            "orders",
            "OrderFailed",
            json!({"msgId": "it-token-dlq", "success": false}),
            &RetryHeaders {
                delay: 2,
                max_retry: 3,
                retry_count: 3,
            },
        )
        .await
        .unwrap();

    let summary = scheduler.drain_bucket(&bucket).await.unwrap();
    assert_eq!(summary.published, 0);
    assert_eq!(summary.dead_lettered, 1);
    assert!(publisher.records.lock().await.is_empty());

    let mut store_check = store.clone();
    assert_eq!(store_check.hlen("it:dead-letter").await.unwrap(), 1);
    let stored: Option<String> = store_check
        .hget("it:dead-letter", "OrderFailed")
        .await
        .unwrap();
    let entry: Value = serde_json::from_str(&stored.unwrap()).unwrap();
    assert_eq!(entry["value"]["msgId"], json!("it-token-dlq"));
    assert_eq!(
        entry["headers"],
        json!({"delay": "2", "maxRetry": "3", "retryCount": "4"})
    );

    clear_keys(&store, &[&bucket, "it-token-dlq", "it:dead-letter"]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_same_event_escalation_overwrites() {
    // Current behavior, pinned on purpose: the sink keeps the most recent
    // exhausted payload per event name, not a history.
    let store = test_store().await;
    clear_keys(&store, &["it:dead-letter-overwrite"]).await;

    let sink = DeadLetterSink::new(store.clone(), "it:dead-letter-overwrite");

    let envelope = |msg_id: &str| RetryEnvelope {
        topic: "orders".to_string(),
        event: "OrderFailed".to_string(),
        value: json!({"msgId": msg_id, "success": false}),
        options: RetryOptions {
            delay: 2,
            max_retry: 3,
            retry_count: 4,
            execute_at: "2024-01-01 10:03:00".to_string(),
        },
    };

    sink.escalate(&envelope("it-first")).await.unwrap();
    sink.escalate(&envelope("it-second")).await.unwrap();

    let mut store_check = store.clone();
    assert_eq!(store_check.hlen("it:dead-letter-overwrite").await.unwrap(), 1);
    let stored: Option<String> = store_check
        .hget("it:dead-letter-overwrite", "OrderFailed")
        .await
        .unwrap();
    let entry: Value = serde_json::from_str(&stored.unwrap()).unwrap();
    assert_eq!(entry["value"]["msgId"], json!("it-second"));

    clear_keys(&store, &["it:dead-letter-overwrite"]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_entry_without_token_is_skipped() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003"]).await;

    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = scheduler_with(store.clone(), publisher.clone(), None);

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let bucket = scheduler
        .enqueue_at(
            now,
            "orders",
            "OrderFailed",
            json!({"success": false}), // no msgId - no dedup requested
            &RetryHeaders {
                delay: 2,
                max_retry: 3,
                retry_count: 0,
            },
        )
        .await
        .unwrap();

    let summary = scheduler.drain_bucket(&bucket).await.unwrap();
    assert_eq!(summary.found, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.published, 0);
    assert!(publisher.records.lock().await.is_empty());

    clear_keys(&store, &[&bucket]).await;
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_corrupt_entry_does_not_poison_the_bucket() {
    let store = test_store().await;
    clear_keys(&store, &["20240101-1003", "it-token-after-corrupt"]).await;

    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = scheduler_with(store.clone(), publisher.clone(), None);

    // A corrupt blob ahead of a valid entry in the same bucket
    let mut store_seed = store.clone();
    store_seed
        .rpush("20240101-1003", "{not valid json")
        .await
        .unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
    let bucket = scheduler
        .enqueue_at(
            now,
            "orders",
            "OrderFailed",
            json!({"msgId": "it-token-after-corrupt", "success": false}),
            &RetryHeaders {
                delay: 2,
                max_retry: 3,
                retry_count: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(bucket, "20240101-1003");

    let summary = scheduler.drain_bucket(&bucket).await.unwrap();
    assert_eq!(summary.found, 2);
    assert_eq!(summary.corrupt, 1);
    assert_eq!(summary.published, 1);

    clear_keys(&store, &[&bucket]).await;
}
