//! In-memory RTDB implementation
//!
//! Uses DashMap for lock-free concurrent access. Used by the harness tests and
//! for dry runs without a Redis instance.

use crate::traits::*;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Message recorded by [`MemoryRtdb::publish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub message: String,
}

/// In-memory RTDB implementation with concurrent access support
pub struct MemoryRtdb {
    kv_store: Arc<DashMap<String, Bytes>>,
    hash_store: Arc<DashMap<String, DashMap<String, Bytes>>>,
    published: Arc<RwLock<Vec<PublishedMessage>>>,
}

impl MemoryRtdb {
    /// Create new in-memory RTDB instance
    pub fn new() -> Self {
        Self {
            kv_store: Arc::new(DashMap::new()),
            hash_store: Arc::new(DashMap::new()),
            published: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.kv_store.clear();
        self.hash_store.clear();
        self.published.write().clear();
    }

    /// Messages published so far, oldest first
    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published.read().clone()
    }

    /// Get statistics about stored data
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            kv_count: self.kv_store.len(),
            hash_count: self.hash_store.len(),
            published_count: self.published.read().len(),
        }
    }
}

impl Default for MemoryRtdb {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about memory RTDB usage
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub kv_count: usize,
    pub hash_count: usize,
    pub published_count: usize,
}

/// Convert a Redis glob pattern (`*`, `?`) into an anchored regex
fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    re
}

#[async_trait]
impl Rtdb for MemoryRtdb {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.kv_store.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.kv_store.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let kv_removed = self.kv_store.remove(key).is_some();
        let hash_removed = self.hash_store.remove(key).is_some();
        Ok(kv_removed || hash_removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.kv_store.contains_key(key) || self.hash_store.contains_key(key))
    }

    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<()> {
        self.hash_store
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        Ok(self
            .hash_store
            .get(key)
            .and_then(|hash| hash.get(field).map(|v| v.clone())))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        if let Some(hash) = self.hash_store.get(key) {
            Ok(hash
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect())
        } else {
            Ok(HashMap::new())
        }
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        if let Some(hash) = self.hash_store.get(key) {
            Ok(hash.remove(field).is_some())
        } else {
            Ok(false)
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u32> {
        tracing::trace!(channel, message, "MemoryRtdb: PUBLISH");
        self.published.write().push(PublishedMessage {
            channel: channel.to_string(),
            message: message.to_string(),
        });
        Ok(0) // No subscribers in memory mode
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        tracing::trace!(pattern, "MemoryRtdb: SCAN MATCH");

        let re = regex::Regex::new(&glob_to_regex(pattern))?;

        let mut matches: Vec<String> = self
            .kv_store
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.hash_store.iter().map(|entry| entry.key().clone()))
            .filter(|key| re.is_match(key))
            .collect();

        matches.sort();
        matches.dedup();
        Ok(matches)
    }
}
