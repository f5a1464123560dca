// Shared application state, following the teacher's `app::AppState`
// pattern: one cheaply-`Clone`able struct of `Arc`s handed to every
// handler and middleware via axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth_service::AuthService;
use crate::blocklist::{DatabaseBlocklist, TokenBlocklist};
use crate::config::AppConfig;
use crate::db::{DatabaseFacade, DbError};
use crate::jwt::{JwtConfig, JwtError, JwtManager};
use crate::models::password_reset::SqlPasswordResetStore;
use crate::models::refresh_token::SqlTokenStore;
use crate::models::user::SqlUserStore;
use crate::rate_limit::{DatabaseRateLimitStore, RateLimitStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseFacade>,
    pub jwt: Arc<JwtManager>,
    pub auth_service: Arc<AuthService>,
    pub blocklist: Arc<dyn TokenBlocklist>,
    pub rate_limiter: Arc<dyn RateLimitStore>,
}

#[derive(Error, Debug)]
pub enum AppStateError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("jwt configuration error: {0}")]
    Jwt(#[from] JwtError),
}

impl AppState {
    /// Wires every component against Postgres-backed stores, the
    /// natural default once the database facade is already connected
    /// (spec §9: memory/SQL backends are substitutable without changing
    /// `AuthService`, so an embedder wanting in-memory blocklist/rate-limit
    /// stores instead can construct `AppState`'s fields directly rather
    /// than going through this helper).
    pub async fn connect(config: AppConfig) -> Result<Self, AppStateError> {
        let config = Arc::new(config);
        let db = Arc::new(DatabaseFacade::connect(&config.database).await?);

        db.register_hook(Arc::new(|sql, args, duration, err| {
            tracing::debug!(sql, ?args, duration_ms = duration.as_millis() as u64, err, "query");
        }));

        let jwt_config = JwtConfig::new(&config.jwt)?;
        let jwt = Arc::new(JwtManager::new(jwt_config));

        let users = Arc::new(SqlUserStore::new(db.clone()));
        let tokens = Arc::new(SqlTokenStore::new(db.clone()));
        let resets = Arc::new(SqlPasswordResetStore::new(db.clone()));
        let blocklist: Arc<dyn TokenBlocklist> = Arc::new(DatabaseBlocklist::new(db.clone()));
        let rate_limiter: Arc<dyn RateLimitStore> = Arc::new(DatabaseRateLimitStore::new(db.clone()));

        let access_ttl = Duration::from_secs(config.jwt.access_token_expiry_secs);
        let auth_service = Arc::new(AuthService::new(
            jwt.clone(),
            users,
            tokens,
            blocklist.clone(),
            resets,
            None,
            access_ttl,
        ));

        Ok(Self {
            config,
            db,
            jwt,
            auth_service,
            blocklist,
            rate_limiter,
        })
    }
}
