//! Trait definitions for RTDB abstraction

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Realtime store used by the rule test harness
///
/// Covers the access patterns the harness needs against the engine's shared
/// store:
/// - Plain string keys (`input:*`, `output:*`, `state:*`, `buffer:*`)
/// - Hash fields (legacy `key:field` addressing)
/// - Pub/Sub publishing
/// - Pattern scan and delete for resetting outputs between scenarios
///
/// Implementations:
/// - `RedisRtdb`: Production Redis backend
/// - `MemoryRtdb`: In-memory backend for testing
#[async_trait]
pub trait Rtdb: Send + Sync + 'static {
    // ========== Basic Key-Value Operations ==========

    /// Get value by key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Set value for key
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Delete key (any type)
    async fn del(&self, key: &str) -> Result<bool>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    // ========== Hash Operations ==========

    /// Set hash field
    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<()>;

    /// Get hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>>;

    /// Get all hash fields
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Bytes>>;

    /// Delete hash field
    async fn hash_del(&self, key: &str, field: &str) -> Result<bool>;

    // ========== Messaging Operations ==========

    /// Publish message to channel (Redis Pub/Sub)
    ///
    /// Returns the number of subscribers that received the message.
    /// In test implementations (MemoryRtdb), this may return 0.
    async fn publish(&self, channel: &str, message: &str) -> Result<u32>;

    // ========== Key Scanning Operations ==========

    /// Scan keys matching a glob pattern (Redis SCAN with MATCH)
    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>>;

    // ========== Convenience Operations (with default implementations) ==========

    /// Get value as UTF-8 text (lossy)
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(key)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Get hash field as UTF-8 text (lossy)
    async fn hash_get_string(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .hash_get(key, field)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Set a text value
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, Bytes::from(value.to_string())).await
    }
}
