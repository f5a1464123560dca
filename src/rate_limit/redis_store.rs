use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};

use super::{RateLimitError, RateLimitStore};

/// Redis-backed fixed-window store. The increment-and-conditionally-expire
/// sequence runs as a single Lua script for atomicity, following the
/// teacher's `redis::Script` usage in services::rate_limit, with the
/// algorithm itself simplified from sliding-window to fixed-window: the
/// key's own Redis TTL *is* `expiresAt`, so "now >= expiresAt" is handled
/// by Redis expiring the key rather than by any comparison in this code.
const INCR_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

pub struct RedisRateLimitStore {
    conn: ConnectionManager,
}

impl RedisRateLimitStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn incr(&self, key: &str, period: Duration) -> Result<u32, RateLimitError> {
        let mut conn = self.conn.clone();
        let count: i64 = Script::new(INCR_SCRIPT)
            .key(key)
            .arg(period.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(count as u32)
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
