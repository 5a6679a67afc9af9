//! Consistency tests for RTDB implementations
//!
//! This module ensures that MemoryRtdb and RedisRtdb behave consistently for the
//! operations the rule test harness relies on.
//! Redis tests are ignored by default and require a running Redis instance.
//!
//! Run all tests (including Redis): `cargo test --package voltage-rtdb --test consistency_tests -- --ignored`

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use bytes::Bytes;
use voltage_rtdb::{MemoryRtdb, Rtdb};

const REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Helper to create a unique test key prefix
fn test_key(suffix: &str) -> String {
    format!("test:consistency:{}:{}", uuid::Uuid::new_v4(), suffix)
}

async fn check_hash_roundtrip(rtdb: &dyn Rtdb, key: &str) {
    rtdb.hash_set(key, "field1", Bytes::from("value1"))
        .await
        .unwrap();

    let result = rtdb.hash_get_string(key, "field1").await.unwrap();
    assert_eq!(result.as_deref(), Some("value1"));

    let missing = rtdb.hash_get(key, "nope").await.unwrap();
    assert_eq!(missing, None);

    assert!(rtdb.hash_del(key, "field1").await.unwrap());
    assert!(!rtdb.hash_del(key, "field1").await.unwrap());
}

async fn check_overwrite(rtdb: &dyn Rtdb, key: &str) {
    rtdb.set_string(key, "false").await.unwrap();
    rtdb.set_string(key, "true").await.unwrap();

    assert_eq!(rtdb.get_string(key).await.unwrap().as_deref(), Some("true"));
    assert!(rtdb.del(key).await.unwrap());
    assert_eq!(rtdb.get(key).await.unwrap(), None);
}

// ============================================================================
// Hash Operations
// ============================================================================

#[tokio::test]
async fn test_memory_hash_roundtrip() {
    let rtdb = MemoryRtdb::new();
    check_hash_roundtrip(&rtdb, "test:hash").await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_hash_roundtrip() {
    use voltage_rtdb::RedisRtdb;

    let rtdb = RedisRtdb::new(REDIS_URL).await.unwrap();
    let key = test_key("hash");
    check_hash_roundtrip(&rtdb, &key).await;

    // Cleanup
    rtdb.del(&key).await.ok();
}

// ============================================================================
// Latched Values (overwrite then delete)
// ============================================================================

#[tokio::test]
async fn test_memory_overwrite() {
    let rtdb = MemoryRtdb::new();
    check_overwrite(&rtdb, "output:latched").await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_overwrite() {
    use voltage_rtdb::RedisRtdb;

    let rtdb = RedisRtdb::new(REDIS_URL).await.unwrap();
    let key = test_key("latched");
    check_overwrite(&rtdb, &key).await;
}

// ============================================================================
// Missing Keys
// ============================================================================

#[tokio::test]
async fn test_memory_missing_key_is_none() {
    let rtdb = MemoryRtdb::new();
    assert_eq!(rtdb.get_string("output:never_written").await.unwrap(), None);
    assert!(rtdb.hash_get_all("nothing").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_missing_key_is_none() {
    use voltage_rtdb::RedisRtdb;

    let rtdb = RedisRtdb::new(REDIS_URL).await.unwrap();
    let key = test_key("missing");
    assert_eq!(rtdb.get_string(&key).await.unwrap(), None);
    assert!(rtdb.hash_get_all(&key).await.unwrap().is_empty());
}
