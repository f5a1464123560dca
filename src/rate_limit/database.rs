use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use async_trait::async_trait;

use crate::db::{BindValue, DatabaseFacade};

use super::{RateLimitError, RateLimitStore};

/// Database-backed fixed-window store: one row per key, upserted
/// atomically so concurrent hits across instances still serialize
/// through Postgres's row lock rather than racing in application code.
pub struct DatabaseRateLimitStore {
    db: Arc<DatabaseFacade>,
}

impl DatabaseRateLimitStore {
    pub fn new(db: Arc<DatabaseFacade>) -> Self {
        Self { db }
    }
}

const UPSERT_SQL: &str = "\
    INSERT INTO rate_limits (key, count, expires_at) VALUES ($1, 1, $2) \
    ON CONFLICT (key) DO UPDATE SET \
        count = CASE WHEN rate_limits.expires_at <= now() THEN 1 ELSE rate_limits.count + 1 END, \
        expires_at = CASE WHEN rate_limits.expires_at <= now() THEN excluded.expires_at ELSE rate_limits.expires_at END \
    RETURNING count";

#[async_trait]
impl RateLimitStore for DatabaseRateLimitStore {
    async fn incr(&self, key: &str, period: Duration) -> Result<u32, RateLimitError> {
        let expires_at = Utc::now() + chrono::Duration::from_std(period).unwrap_or_default();
        let pool = self.db.write_pool();

        let start = Instant::now();
        let result = sqlx::query_as::<_, (i32,)>(UPSERT_SQL)
            .bind(key)
            .bind(expires_at)
            .fetch_one(pool)
            .await;
        let duration = start.elapsed();

        match result {
            Ok((count,)) => {
                self.db.record_query(
                    UPSERT_SQL,
                    &[key.to_string(), "<ts>".to_string()],
                    duration,
                    None,
                );
                Ok(count as u32)
            }
            Err(e) => {
                self.db.record_query(
                    UPSERT_SQL,
                    &[key.to_string(), "<ts>".to_string()],
                    duration,
                    Some(&e.to_string()),
                );
                Err(RateLimitError::Database(crate::db::DbError::Query(e)))
            }
        }
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.db
            .exec(
                "DELETE FROM rate_limits WHERE key = $1",
                vec![BindValue::Str(key.to_string())],
            )
            .await
            .map_err(RateLimitError::Database)?;
        Ok(())
    }
}
