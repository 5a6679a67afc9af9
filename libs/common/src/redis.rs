//! Pooled Redis access
//!
//! The rule engine under test reads and writes plain keys, hash fields and
//! pub/sub channels. `RedisPool` hands out bb8 connections and runs single
//! commands against them; command construction stays with the caller.

use anyhow::{Context, Result};
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::{Cmd, FromRedisValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for the engine's Redis instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    /// e.g. "redis://localhost:6379"
    pub url: String,
    pub pool_size: u32,
    pub connect_timeout_ms: u64,
    /// COUNT hint passed to SCAN
    pub scan_batch: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 4,
            connect_timeout_ms: 3000,
            scan_batch: 200,
        }
    }
}

impl RedisConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Shared connection pool; clones share the same connections
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool<RedisConnectionManager>,
    url: String,
    scan_batch: usize,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("RedisPool")
            .field("url", &self.url)
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

impl RedisPool {
    /// Build the pool and verify the server answers PING
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .with_context(|| format!("Invalid Redis URL: {}", config.url))?;

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build(manager)
            .await
            .context("Failed to build Redis connection pool")?;

        let this = Self {
            pool,
            url: config.url.clone(),
            scan_batch: config.scan_batch.max(1),
        };

        let pong: String = this.query("PING", &redis::cmd("PING")).await?;
        debug!(url = %this.url, reply = %pong, "Redis pool ready");
        Ok(this)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run one command on a pooled connection
    ///
    /// `op` names the operation in error context.
    pub async fn query<T: FromRedisValue>(&self, op: &str, cmd: &Cmd) -> Result<T> {
        let mut conn = self
            .pool
            .get()
            .await
            .with_context(|| format!("No Redis connection available for {}", op))?;
        cmd.query_async(&mut *conn)
            .await
            .with_context(|| format!("Redis {} failed", op))
    }

    /// All keys matching a glob pattern, sorted and deduplicated
    ///
    /// Iterates SCAN to completion rather than issuing KEYS.
    pub async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.scan_batch);
            let (next, batch): (u64, Vec<String>) = self
                .query(&format!("SCAN {}", pattern), &cmd)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_config_from_url_keeps_pool_defaults() {
        let config = RedisConfig::from_url("redis://10.0.0.5:6380");
        assert_eq!(config.url, "redis://10.0.0.5:6380");
        assert_eq!(config.pool_size, RedisConfig::default().pool_size);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: RedisConfig = serde_json::from_str(r#"{"url":"redis://db:6379"}"#).unwrap();
        assert_eq!(config.url, "redis://db:6379");
        assert_eq!(config.scan_batch, 200);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let err = RedisPool::connect(&RedisConfig::from_url("not a url"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid Redis URL"));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_query_and_scan() {
        let pool = RedisPool::connect(&RedisConfig::default()).await.unwrap();

        for key in ["test:pool:a", "test:pool:b"] {
            let _: () = pool
                .query("SET", redis::cmd("SET").arg(key).arg("1"))
                .await
                .unwrap();
        }
        let keys = pool.scan_match("test:pool:*").await.unwrap();
        assert_eq!(keys, vec!["test:pool:a", "test:pool:b"]);

        let removed: u32 = pool
            .query("DEL", redis::cmd("DEL").arg(&keys))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }
}
