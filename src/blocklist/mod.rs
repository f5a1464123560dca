// Session blocklist: a key-with-TTL set consulted on every access-token
// verification, so reads must be O(1) amortized. Grounded on the
// teacher's rate limiter's in-memory TTL bookkeeping (services/rate_limit.rs)
// generalized from a counter to a plain membership set, plus a database
// backend following db::postgres's upsert idiom.

pub mod database;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlocklistError {
    #[error("database error: {0}")]
    Database(#[from] crate::db::DbError),
}

#[async_trait]
pub trait TokenBlocklist: Send + Sync {
    /// Marks `sid` invalid for `ttl`. Inserting an already-present sid
    /// refreshes its expiry to `now + ttl`.
    async fn invalidate(&self, sid: &str, ttl: Duration) -> Result<(), BlocklistError>;

    /// `true` iff an unexpired entry for `sid` exists.
    async fn is_invalidated(&self, sid: &str) -> Result<bool, BlocklistError>;
}

pub use database::DatabaseBlocklist;
pub use memory::MemoryBlocklist;
