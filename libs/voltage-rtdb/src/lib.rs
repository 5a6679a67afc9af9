//! Realtime store access for rule tests
//!
//! The rule engine reads `input:*`/`state:*` keys from a shared store and
//! writes `output:*` keys back. [`Rtdb`] abstracts that store so the harness
//! can drive a live Redis instance or an in-process [`MemoryRtdb`].

pub mod traits;

#[cfg(feature = "redis-backend")]
pub mod redis_impl;

pub mod memory_impl;

pub use bytes::Bytes;
pub use traits::Rtdb;

#[cfg(feature = "redis-backend")]
pub use redis_impl::RedisRtdb;

pub use memory_impl::{MemoryRtdb, MemoryStats, PublishedMessage};
