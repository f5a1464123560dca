// Authenticatable user entity and store. Grounded on the teacher's
// models::user::{User, UserUpdate, User::find_by_email/update} shape,
// rebuilt against sqlx (the teacher's Diesel `AsChangeset` tri-state
// update pattern is kept, expressed as a dynamic `QueryBuilder` update
// since sqlx has no changeset macro of its own) and trimmed to only the
// fields this subsystem actually owns (no subscription/onboarding state,
// which belongs to the host application).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("database error: {0}")]
    Database(#[from] crate::db::DbError),
    #[error("user not found")]
    NotFound,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update. Each field is `None` (leave unchanged) or
/// `Some(value)` (set). `company_name`-style nullable columns would need
/// `Option<Option<T>>` to distinguish "leave unchanged" from "set to
/// NULL"; this entity has none, but `email`/`password_hash` keep that
/// shape for parity with the update pattern the rest of the store layer
/// uses.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password_hash.is_none()
    }
}

#[async_trait]
pub trait AuthUserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<User, UserError>;
    async fn find_by_email(&self, email: &str) -> Result<User, UserError>;
    async fn update(&self, id: &str, update: UserUpdate) -> Result<User, UserError>;
    async fn set_password(&self, id: &str, password_hash: &str) -> Result<(), UserError>;
}

pub struct SqlUserStore {
    db: std::sync::Arc<crate::db::DatabaseFacade>,
}

impl SqlUserStore {
    pub fn new(db: std::sync::Arc<crate::db::DatabaseFacade>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuthUserStore for SqlUserStore {
    async fn find_by_id(&self, id: &str) -> Result<User, UserError> {
        let uuid = Uuid::parse_str(id).map_err(|_| UserError::NotFound)?;
        const SQL: &str = "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE id = $1";
        let pool = self.db.read_pool_for(SQL);
        let start = std::time::Instant::now();
        let result = sqlx::query_as::<_, User>(SQL).bind(uuid).fetch_optional(pool).await;
        self.db.record_query(SQL, &[id.to_string()], start.elapsed(), result.as_ref().err().map(|e| e.to_string()).as_deref());
        result.map_err(crate::db::DbError::Query)?.ok_or(UserError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, UserError> {
        const SQL: &str = "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE lower(email) = lower($1)";
        let pool = self.db.read_pool_for(SQL);
        let start = std::time::Instant::now();
        let result = sqlx::query_as::<_, User>(SQL).bind(email).fetch_optional(pool).await;
        self.db.record_query(SQL, &[email.to_string()], start.elapsed(), result.as_ref().err().map(|e| e.to_string()).as_deref());
        result.map_err(crate::db::DbError::Query)?.ok_or(UserError::NotFound)
    }

    async fn update(&self, id: &str, update: UserUpdate) -> Result<User, UserError> {
        let uuid = Uuid::parse_str(id).map_err(|_| UserError::NotFound)?;
        if update.is_empty() {
            return self.find_by_id(id).await;
        }

        let mut builder = QueryBuilder::new("UPDATE users SET updated_at = now()");
        if let Some(email) = &update.email {
            builder.push(", email = ").push_bind(email.clone());
        }
        if let Some(password_hash) = &update.password_hash {
            builder.push(", password_hash = ").push_bind(password_hash.clone());
        }
        builder.push(" WHERE id = ").push_bind(uuid);
        builder.push(" RETURNING id, email, password_hash, created_at, updated_at");

        let start = std::time::Instant::now();
        let result = builder.build_query_as::<User>().fetch_optional(self.db.write_pool()).await;
        self.db.record_query(
            "UPDATE users SET ... WHERE id = $n",
            &[id.to_string()],
            start.elapsed(),
            result.as_ref().err().map(|e| e.to_string()).as_deref(),
        );
        result.map_err(crate::db::DbError::Query)?.ok_or(UserError::NotFound)
    }

    async fn set_password(&self, id: &str, password_hash: &str) -> Result<(), UserError> {
        self.update(
            id,
            UserUpdate {
                email: None,
                password_hash: Some(password_hash.to_string()),
            },
        )
        .await?;
        Ok(())
    }
}
