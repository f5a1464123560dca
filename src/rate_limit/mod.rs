// Fixed-window rate limiting. Grounded on the teacher's
// services::rate_limit (TTL bookkeeping, Redis Lua-script atomicity,
// #[instrument] usage) with the algorithm itself rewritten: this engine
// is fixed-window only, no sliding window or token bucket.

pub mod database;
pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("database error: {0}")]
    Database(#[from] crate::db::DbError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// `key -> count` fixed-window counter. `k` is `ip:<addr>` or
/// `user:<id>`; the caller decides the namespace.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increments the counter for `key`. The first hit in a fresh window
    /// creates the entry with `expiresAt = now + period` and returns 1;
    /// subsequent hits within the window increment without extending
    /// `expiresAt`. Once `now >= expiresAt` the entry is treated as absent
    /// and the cycle restarts.
    async fn incr(&self, key: &str, period: Duration) -> Result<u32, RateLimitError>;

    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;
}

pub use database::DatabaseRateLimitStore;
pub use memory::MemoryRateLimitStore;
pub use redis_store::RedisRateLimitStore;
