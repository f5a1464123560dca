// Refresh token entity and store. Grounded on the teacher's
// RefreshToken::{store, validate, revoke, revoke_all_for_user}, with the
// hash scheme changed from salted-JTI-SHA-256 to a direct SHA-256 of the
// raw refresh token: the token itself already carries 256+ bits of
// signed entropy, so a salt buys nothing, and hashing the raw token
// (rather than just its `jti`) means a stolen but not-yet-decoded token
// still can't be looked up without the hash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{BindValue, DatabaseFacade};

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("database error: {0}")]
    Database(#[from] crate::db::DbError),
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn hash_token(raw_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Active iff not revoked and not expired. The terminal state
    /// (revoked or expired) never reverts to active.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none() && self.expires_at > Utc::now()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        device: DeviceInfo,
    ) -> Result<RefreshToken, TokenStoreError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, TokenStoreError>;

    /// `true` iff a row was revoked. Revoking an absent or
    /// already-revoked hash is not an error (the caller — the rotation
    /// flow — deliberately ignores this failure mode).
    async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, TokenStoreError>;

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, TokenStoreError>;
}

pub struct SqlTokenStore {
    db: std::sync::Arc<DatabaseFacade>,
}

impl SqlTokenStore {
    pub fn new(db: std::sync::Arc<DatabaseFacade>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for SqlTokenStore {
    async fn save(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        device: DeviceInfo,
    ) -> Result<RefreshToken, TokenStoreError> {
        let user_uuid = Uuid::parse_str(user_id).map_err(|_| {
            TokenStoreError::Database(crate::db::DbError::Pool("invalid user id".into()))
        })?;

        const SQL: &str = "INSERT INTO refresh_tokens \
            (id, user_id, token_hash, user_agent, ip_address, expires_at, created_at) \
            VALUES ($1, $2, $3, $4, $5, $6, now()) \
            RETURNING id, user_id, token_hash, user_agent, ip_address, expires_at, created_at, revoked_at";

        let id = Uuid::new_v4();
        let start = std::time::Instant::now();
        let result = sqlx::query_as::<_, RefreshToken>(SQL)
            .bind(id)
            .bind(user_uuid)
            .bind(token_hash)
            .bind(&device.user_agent)
            .bind(&device.ip_address)
            .bind(expires_at)
            .fetch_one(self.db.write_pool())
            .await;
        self.db.record_query(
            SQL,
            &[user_id.to_string(), token_hash.to_string()],
            start.elapsed(),
            result.as_ref().err().map(|e| e.to_string()).as_deref(),
        );
        result.map_err(|e| TokenStoreError::Database(crate::db::DbError::Query(e)))
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
        const SQL: &str = "SELECT id, user_id, token_hash, user_agent, ip_address, expires_at, created_at, revoked_at \
            FROM refresh_tokens WHERE token_hash = $1";
        let pool = self.db.read_pool_for(SQL);
        let start = std::time::Instant::now();
        let result = sqlx::query_as::<_, RefreshToken>(SQL)
            .bind(token_hash)
            .fetch_optional(pool)
            .await;
        self.db.record_query(
            SQL,
            &[token_hash.to_string()],
            start.elapsed(),
            result.as_ref().err().map(|e| e.to_string()).as_deref(),
        );
        result.map_err(|e| TokenStoreError::Database(crate::db::DbError::Query(e)))
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, TokenStoreError> {
        let affected = self
            .db
            .exec(
                "UPDATE refresh_tokens SET revoked_at = now() WHERE token_hash = $1 AND revoked_at IS NULL",
                vec![BindValue::Str(token_hash.to_string())],
            )
            .await
            .map_err(TokenStoreError::Database)?;
        Ok(affected > 0)
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, TokenStoreError> {
        let user_uuid = Uuid::parse_str(user_id).map_err(|_| {
            TokenStoreError::Database(crate::db::DbError::Pool("invalid user id".into()))
        })?;
        let affected = self
            .db
            .exec(
                "UPDATE refresh_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL",
                vec![BindValue::Uuid(user_uuid)],
            )
            .await
            .map_err(TokenStoreError::Database)?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn hashing_is_deterministic() {
        let a = RefreshToken::hash_token("raw-token-value");
        let b = RefreshToken::hash_token("raw-token-value");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn distinct_tokens_hash_differently() {
        assert_ne!(
            RefreshToken::hash_token("a"),
            RefreshToken::hash_token("b")
        );
    }

    #[test]
    fn active_requires_unrevoked_and_unexpired() {
        let now = Utc::now();
        let base = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "h".into(),
            user_agent: None,
            ip_address: None,
            expires_at: now + Duration::hours(1),
            created_at: now,
            revoked_at: None,
        };
        assert!(base.is_active());

        let expired = RefreshToken {
            expires_at: now - Duration::hours(1),
            ..base.clone()
        };
        assert!(!expired.is_active());

        let revoked = RefreshToken {
            revoked_at: Some(now),
            ..base
        };
        assert!(!revoked.is_active());
    }
}
