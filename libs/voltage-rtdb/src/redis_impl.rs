//! Redis backend

use crate::traits::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use common::redis::{RedisConfig, RedisPool};
use redis::cmd;
use std::collections::HashMap;

/// Store backed by the engine's Redis instance
#[derive(Debug, Clone)]
pub struct RedisRtdb {
    pool: RedisPool,
}

impl RedisRtdb {
    /// Connect with default pool settings (pings the server)
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_config(RedisConfig::from_url(url)).await
    }

    pub async fn with_config(config: RedisConfig) -> Result<Self> {
        Ok(Self {
            pool: RedisPool::connect(&config).await?,
        })
    }

    pub fn url(&self) -> &str {
        self.pool.url()
    }
}

fn to_text(value: Bytes) -> Result<String> {
    String::from_utf8(value.to_vec()).context("Stored values must be UTF-8 text")
}

#[async_trait]
impl Rtdb for RedisRtdb {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let value: Option<String> = self.pool.query("GET", cmd("GET").arg(key)).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let text = to_text(value)?;
        self.pool.query("SET", cmd("SET").arg(key).arg(text)).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed: u32 = self.pool.query("DEL", cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found: u32 = self.pool.query("EXISTS", cmd("EXISTS").arg(key)).await?;
        Ok(found > 0)
    }

    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<()> {
        let text = to_text(value)?;
        let _: u32 = self
            .pool
            .query("HSET", cmd("HSET").arg(key).arg(field).arg(text))
            .await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        let value: Option<String> = self
            .pool
            .query("HGET", cmd("HGET").arg(key).arg(field))
            .await?;
        Ok(value.map(Bytes::from))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        let fields: HashMap<String, String> =
            self.pool.query("HGETALL", cmd("HGETALL").arg(key)).await?;
        Ok(fields.into_iter().map(|(k, v)| (k, Bytes::from(v))).collect())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        let removed: u32 = self
            .pool
            .query("HDEL", cmd("HDEL").arg(key).arg(field))
            .await?;
        Ok(removed > 0)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u32> {
        self.pool
            .query("PUBLISH", cmd("PUBLISH").arg(channel).arg(message))
            .await
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        self.pool.scan_match(pattern).await
    }
}
