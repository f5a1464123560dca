use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::db::{BindValue, DatabaseFacade};

use super::{BlocklistError, TokenBlocklist};

/// Database-backed blocklist: an unlogged table keyed by `sid` with an
/// index on `expires_at`, upserted on every invalidation. Grounded on the
/// upsert-and-check shape the rate limiter's database backend uses.
pub struct DatabaseBlocklist {
    db: Arc<DatabaseFacade>,
}

impl DatabaseBlocklist {
    pub fn new(db: Arc<DatabaseFacade>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenBlocklist for DatabaseBlocklist {
    async fn invalidate(&self, sid: &str, ttl: Duration) -> Result<(), BlocklistError> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        self.db
            .exec(
                "INSERT INTO token_blocklist (sid, expires_at) VALUES ($1, $2) \
                 ON CONFLICT (sid) DO UPDATE SET expires_at = excluded.expires_at",
                vec![
                    BindValue::Str(sid.to_string()),
                    BindValue::TimestampTz(expires_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn is_invalidated(&self, sid: &str) -> Result<bool, BlocklistError> {
        let exists = self
            .db
            .query_row_exists(
                "SELECT 1 FROM token_blocklist WHERE sid = $1 AND expires_at > now()",
                vec![BindValue::Str(sid.to_string())],
            )
            .await?;
        Ok(exists)
    }
}
