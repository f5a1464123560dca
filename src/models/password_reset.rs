// Password reset token entity and store. Grounded on the teacher's
// models::password_reset (entity shape, validated request/response DTOs)
// rebuilt against sqlx; `usedAt` is monotonic per the spec invariant —
// once set, a reset token is terminal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{BindValue, DatabaseFacade};

#[derive(Error, Debug)]
pub enum PasswordResetError {
    #[error("database error: {0}")]
    Database(#[from] crate::db::DbError),
}

#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn hash_token(raw_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        self.used_at.is_none() && self.expires_at > Utc::now()
    }
}

#[derive(Debug, Serialize, Deserialize, validator::Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "please provide a valid email address"))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, validator::Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 32, max = 128, message = "invalid reset token"))]
    pub token: String,

    #[validate(length(min = 8, max = 128, message = "password must be between 8 and 128 characters"))]
    pub new_password: String,
}

#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    async fn save(&self, user_id: &str, token_hash: &str, expires_at: DateTime<Utc>) -> Result<PasswordResetToken, PasswordResetError>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, PasswordResetError>;
    async fn mark_used(&self, token_hash: &str) -> Result<bool, PasswordResetError>;
}

pub struct SqlPasswordResetStore {
    db: std::sync::Arc<DatabaseFacade>,
}

impl SqlPasswordResetStore {
    pub fn new(db: std::sync::Arc<DatabaseFacade>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PasswordResetStore for SqlPasswordResetStore {
    async fn save(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetToken, PasswordResetError> {
        let user_uuid = Uuid::parse_str(user_id)
            .map_err(|_| PasswordResetError::Database(crate::db::DbError::Pool("invalid user id".into())))?;

        const SQL: &str = "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at) \
            VALUES ($1, $2, $3, $4, now()) \
            RETURNING id, user_id, token_hash, expires_at, used_at, created_at";

        let start = std::time::Instant::now();
        let result = sqlx::query_as::<_, PasswordResetToken>(SQL)
            .bind(Uuid::new_v4())
            .bind(user_uuid)
            .bind(token_hash)
            .bind(expires_at)
            .fetch_one(self.db.write_pool())
            .await;
        self.db.record_query(
            SQL,
            &[user_id.to_string(), "<token-hash>".to_string()],
            start.elapsed(),
            result.as_ref().err().map(|e| e.to_string()).as_deref(),
        );
        result.map_err(|e| PasswordResetError::Database(crate::db::DbError::Query(e)))
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, PasswordResetError> {
        const SQL: &str = "SELECT id, user_id, token_hash, expires_at, used_at, created_at \
            FROM password_reset_tokens WHERE token_hash = $1";
        let pool = self.db.read_pool_for(SQL);
        let start = std::time::Instant::now();
        let result = sqlx::query_as::<_, PasswordResetToken>(SQL)
            .bind(token_hash)
            .fetch_optional(pool)
            .await;
        self.db.record_query(
            SQL,
            &["<token-hash>".to_string()],
            start.elapsed(),
            result.as_ref().err().map(|e| e.to_string()).as_deref(),
        );
        result.map_err(|e| PasswordResetError::Database(crate::db::DbError::Query(e)))
    }

    async fn mark_used(&self, token_hash: &str) -> Result<bool, PasswordResetError> {
        let affected = self
            .db
            .exec(
                "UPDATE password_reset_tokens SET used_at = now() WHERE token_hash = $1 AND used_at IS NULL",
                vec![BindValue::Str(token_hash.to_string())],
            )
            .await
            .map_err(PasswordResetError::Database)?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn valid_requires_unused_and_unexpired() {
        let now = Utc::now();
        let base = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "h".into(),
            expires_at: now + Duration::hours(1),
            used_at: None,
            created_at: now,
        };
        assert!(base.is_valid());

        let expired = PasswordResetToken { expires_at: now - Duration::hours(1), ..base.clone() };
        assert!(!expired.is_valid());

        let used = PasswordResetToken { used_at: Some(now), ..base };
        assert!(!used.is_valid());
    }
}
