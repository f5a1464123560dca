// The login/refresh/logout/password-reset state machine. Grounded on
// the teacher's services::jwt::JwtService login/refresh/logout methods
// and services::password_reset::PasswordResetService, recomposed over
// the capability-set traits (`AuthUserStore`, `TokenStore`,
// `TokenBlocklist`, `PasswordResetStore`, `JwtManager`) per spec §9's
// "interface abstraction" design note so memory, SQL, or other backends
// are substitutable without changing this service.
//
// This is the only layer that converts the lower modules' narrow
// `thiserror` enums into `ApiError`; credential failures collapse to a
// generic message here (spec §4.2) and are logged with their real kind
// before conversion.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::RngCore;
use serde_json::{Map, Value};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::blocklist::TokenBlocklist;
use crate::error::ApiError;
use crate::jwt::manager::JwtManager;
use crate::models::password_reset::{PasswordResetStore, PasswordResetToken};
use crate::models::refresh_token::{DeviceInfo, RefreshToken, TokenStore};
use crate::models::user::{AuthUserStore, UserUpdate};

const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const RESET_TOKEN_TTL_HOURS: i64 = 1;
const RESET_TOKEN_BYTES: usize = 32;

/// Successful login/refresh result: the pair the client stores.
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Host-supplied hook for enriching a freshly issued access token with
/// claims this crate has no way of deriving itself (a tenant id, a role
/// list, feature flags, ...). Held as a `Weak` rather than an `Arc`: the
/// host application owns the provider, and an `AuthService` outliving it
/// should just stop materializing extra claims rather than keep it alive.
#[async_trait]
pub trait ClaimsProvider: Send + Sync {
    async fn extra_claims(&self, user_id: &str, email: &str) -> Map<String, Value>;
}

pub struct AuthService {
    jwt: Arc<JwtManager>,
    users: Arc<dyn AuthUserStore>,
    tokens: Arc<dyn TokenStore>,
    blocklist: Arc<dyn TokenBlocklist>,
    resets: Arc<dyn PasswordResetStore>,
    claims_provider: Option<Weak<dyn ClaimsProvider>>,
    access_token_ttl: Duration,
}

impl AuthService {
    pub fn new(
        jwt: Arc<JwtManager>,
        users: Arc<dyn AuthUserStore>,
        tokens: Arc<dyn TokenStore>,
        blocklist: Arc<dyn TokenBlocklist>,
        resets: Arc<dyn PasswordResetStore>,
        claims_provider: Option<Weak<dyn ClaimsProvider>>,
        access_token_ttl: Duration,
    ) -> Self {
        Self {
            jwt,
            users,
            tokens,
            blocklist,
            resets,
            claims_provider,
            access_token_ttl,
        }
    }

    /// Upgrades the stored `Weak` and asks it for extra claims, or
    /// returns an empty map when no provider was configured or it has
    /// since been dropped by the host.
    async fn materialize_claims(&self, user_id: &str, email: &str) -> Map<String, Value> {
        match self.claims_provider.as_ref().and_then(Weak::upgrade) {
            Some(provider) => provider.extra_claims(user_id, email).await,
            None => Map::new(),
        }
    }

    /// Validates credentials and issues a fresh `(access, refresh)` pair
    /// bound to a new session id. Any failure past the user lookup
    /// collapses to `Unauthorized` so a caller cannot distinguish
    /// "no such user" from "wrong password".
    #[instrument(skip(self, password, device))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: DeviceInfo,
    ) -> Result<TokenPair, ApiError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Unauthorized("missing credentials"));
        }

        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(|_| ApiError::Unauthorized("no such user"))?;

        let matches = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| ApiError::Internal(format!("bcrypt verify failed: {e}")))?;
        if !matches {
            return Err(ApiError::Unauthorized("password mismatch"));
        }

        let session_id = Uuid::new_v4().to_string();
        let extra_claims = self.materialize_claims(&user.id.to_string(), &user.email).await;
        self.issue_pair(&user.id.to_string(), &user.email, &session_id, device, extra_claims)
            .await
    }

    /// Rotation: verifies `refresh_token` structurally and against the
    /// store, revokes it, issues a new pair under the same session id.
    /// The old-revoke failure is swallowed (already expired/concurrently
    /// revoked); the new-save failure surfaces as `Internal`.
    #[instrument(skip(self, refresh_token, device))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: DeviceInfo,
    ) -> Result<TokenPair, ApiError> {
        let (user_id, session_id) = self
            .jwt
            .verify_refresh_token(refresh_token)
            .map_err(|_| ApiError::Unauthorized("invalid refresh token"))?;

        let hash = RefreshToken::hash_token(refresh_token);
        let stored = self
            .tokens
            .find_by_hash(&hash)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .ok_or(ApiError::Unauthorized("unknown refresh token"))?;

        if !stored.is_active() {
            return Err(ApiError::Unauthorized("refresh token is no longer active"));
        }

        let user = self
            .users
            .find_by_id(&user_id)
            .await
            .map_err(|_| ApiError::Unauthorized("user no longer exists"))?;

        if let Err(e) = self.tokens.revoke_by_hash(&hash).await {
            warn!(error = %e, "failed to revoke superseded refresh token, continuing");
        }

        self.issue_pair(&user_id, &user.email, &session_id, device, Map::new())
            .await
    }

    /// Blocklists the session for `access_token_ttl` (so any access
    /// token bound to it is immediately rejected at verification) and
    /// revokes the refresh token. Blocklist failures are logged, never
    /// fatal; revocation still proceeds.
    #[instrument(skip(self, refresh_token))]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let (_, session_id) = self
            .jwt
            .verify_refresh_token(refresh_token)
            .map_err(|_| ApiError::Unauthorized("invalid refresh token"))?;

        if let Err(e) = self.blocklist.invalidate(&session_id, self.access_token_ttl).await {
            warn!(error = %e, session_id = %session_id, "failed to blocklist session during logout");
        }

        let hash = RefreshToken::hash_token(refresh_token);
        self.tokens
            .revoke_by_hash(&hash)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Enumeration-safe: always returns `Ok`, returning `None` when the
    /// email does not resolve to a user so the caller can deliver
    /// nothing out-of-band without revealing that fact in its own
    /// response shape.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>, ApiError> {
        let user = match self.users.find_by_email(email).await {
            Ok(u) => u,
            Err(_) => return Ok(None),
        };

        let mut raw = [0u8; RESET_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let raw_token = hex_encode(&raw);
        let hash = PasswordResetToken::hash_token(&raw_token);
        let expires_at = Utc::now() + ChronoDuration::hours(RESET_TOKEN_TTL_HOURS);

        self.resets
            .save(&user.id.to_string(), &hash, expires_at)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(Some(raw_token))
    }

    /// Looks up the reset token, rejects if expired or used, hashes the
    /// new password, updates the user, marks the token used, and revokes
    /// every refresh token belonging to that user (total session
    /// invalidation). No partial mutation: the reset token is only
    /// marked used, and sessions only revoked, after the password update
    /// itself succeeds.
    #[instrument(skip(self, raw_token, new_password))]
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> Result<(), ApiError> {
        if new_password.len() < 8 {
            return Err(ApiError::Validation(
                [("new_password".to_string(), "must be at least 8 characters".to_string())]
                    .into_iter()
                    .collect(),
            ));
        }

        let hash = PasswordResetToken::hash_token(raw_token);
        let reset = self
            .resets
            .find_by_hash(&hash)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .ok_or(ApiError::Unauthorized("invalid reset token"))?;

        if !reset.is_valid() {
            return Err(ApiError::Unauthorized("reset token expired or already used"));
        }

        let password_hash = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)
            .map_err(|e| ApiError::Internal(format!("bcrypt hash failed: {e}")))?;

        self.users
            .update(
                &reset.user_id.to_string(),
                UserUpdate {
                    email: None,
                    password_hash: Some(password_hash),
                },
            )
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        if let Err(e) = self.resets.mark_used(&hash).await {
            warn!(error = %e, "failed to mark password reset token used after successful reset");
        }

        if let Err(e) = self.tokens.revoke_all_for_user(&reset.user_id.to_string()).await {
            warn!(error = %e, "failed to revoke refresh tokens after password reset");
        }

        Ok(())
    }

    async fn issue_pair(
        &self,
        user_id: &str,
        email: &str,
        session_id: &str,
        device: DeviceInfo,
        extra_claims: Map<String, Value>,
    ) -> Result<TokenPair, ApiError> {
        let access_token = self
            .jwt
            .generate_access_token(user_id, email, session_id, extra_claims)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let refresh_token = self
            .jwt
            .generate_refresh_token(user_id, session_id)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let hash = RefreshToken::hash_token(&refresh_token);
        let expires_at = Utc::now() + ChronoDuration::days(REFRESH_TOKEN_TTL_DAYS);
        self.tokens
            .save(user_id, &hash, expires_at, device)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::memory::MemoryBlocklist;
    use crate::jwt::config::JwtConfig;
    use crate::models::password_reset::PasswordResetError;
    use crate::models::refresh_token::TokenStoreError;
    use crate::models::user::{User, UserError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeUsers {
        users: Mutex<Vec<User>>,
    }

    #[async_trait]
    impl AuthUserStore for FakeUsers {
        async fn find_by_id(&self, id: &str) -> Result<User, UserError> {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id.to_string() == id)
                .cloned()
                .ok_or(UserError::NotFound)
        }

        async fn find_by_email(&self, email: &str) -> Result<User, UserError> {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email)
                .cloned()
                .ok_or(UserError::NotFound)
        }

        async fn update(&self, id: &str, update: UserUpdate) -> Result<User, UserError> {
            let mut guard = self.users.lock().unwrap();
            let user = guard
                .iter_mut()
                .find(|u| u.id.to_string() == id)
                .ok_or(UserError::NotFound)?;
            if let Some(email) = update.email {
                user.email = email;
            }
            if let Some(hash) = update.password_hash {
                user.password_hash = hash;
            }
            Ok(user.clone())
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

    struct FakeTokens {
        rows: Mutex<Vec<RefreshToken>>,
    }

    #[async_trait]
    impl TokenStore for FakeTokens {
        async fn save(
            &self,
            user_id: &str,
            token_hash: &str,
            expires_at: chrono::DateTime<Utc>,
            device: DeviceInfo,
        ) -> Result<RefreshToken, TokenStoreError> {
            let row = RefreshToken {
                id: Uuid::new_v4(),
                user_id: Uuid::parse_str(user_id).unwrap(),
                token_hash: token_hash.to_string(),
                user_agent: device.user_agent,
                ip_address: device.ip_address,
                expires_at,
                created_at: Utc::now(),
                revoked_at: None,
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.token_hash == token_hash)
                .cloned())
        }

        async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, TokenStoreError> {
            let mut guard = self.rows.lock().unwrap();
            if let Some(row) = guard.iter_mut().find(|r| r.token_hash == token_hash && r.revoked_at.is_none()) {
                row.revoked_at = Some(Utc::now());
                return Ok(true);
            }
            Ok(false)
        }

        async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, TokenStoreError> {
            let mut guard = self.rows.lock().unwrap();
            let mut count = 0;
            for row in guard.iter_mut() {
                if row.user_id.to_string() == user_id && row.revoked_at.is_none() {
                    row.revoked_at = Some(Utc::now());
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    struct FakeResets {
        rows: Mutex<Vec<PasswordResetToken>>,
    }

    #[async_trait]
    impl PasswordResetStore for FakeResets {
        async fn save(
            &self,
            user_id: &str,
            token_hash: &str,
            expires_at: chrono::DateTime<Utc>,
        ) -> Result<PasswordResetToken, PasswordResetError> {
            let row = PasswordResetToken {
                id: Uuid::new_v4(),
                user_id: Uuid::parse_str(user_id).unwrap(),
                token_hash: token_hash.to_string(),
                expires_at,
                used_at: None,
                created_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn find_by_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, PasswordResetError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.token_hash == token_hash)
                .cloned())
        }

        async fn mark_used(&self, token_hash: &str) -> Result<bool, PasswordResetError> {
            let mut guard = self.rows.lock().unwrap();
            if let Some(row) = guard.iter_mut().find(|r| r.token_hash == token_hash && r.used_at.is_none()) {
                row.used_at = Some(Utc::now());
                return Ok(true);
            }
            Ok(false)
        }
    }

    fn service(users: Vec<User>) -> AuthService {
        AuthService::new(
            Arc::new(JwtManager::new(JwtConfig::for_test())),
            Arc::new(FakeUsers { users: Mutex::new(users) }),
            Arc::new(FakeTokens { rows: Mutex::new(vec![]) }),
            Arc::new(MemoryBlocklist::new()),
            Arc::new(FakeResets { rows: Mutex::new(vec![]) }),
            None,
            Duration::from_secs(900),
        )
    }

    fn test_user(email: &str, password: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: bcrypt::hash(password, bcrypt::DEFAULT_COST).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn login_then_refresh_rotates_and_invalidates_old_token() {
        let user = test_user("a@example.com", "Aa1!aaaa");
        let svc = service(vec![user]);

        let pair1 = svc
            .login("a@example.com", "Aa1!aaaa", DeviceInfo::default())
            .await
            .unwrap();

        let pair2 = svc
            .refresh(&pair1.refresh_token, DeviceInfo::default())
            .await
            .unwrap();
        assert_ne!(pair1.refresh_token, pair2.refresh_token);

        let err = svc
            .refresh(&pair1.refresh_token, DeviceInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_as_unauthorized() {
        let user = test_user("a@example.com", "Aa1!aaaa");
        let svc = service(vec![user]);

        let err = svc
            .login("a@example.com", "wrong-password", DeviceInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn login_rejects_unknown_email_same_as_wrong_password() {
        let svc = service(vec![]);
        let err = svc
            .login("nobody@example.com", "whatever", DeviceInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn password_reset_request_is_enumeration_safe() {
        let svc = service(vec![]);
        let result = svc.request_password_reset("nobody@example.com").await.unwrap();
        assert!(result.is_none());
    }
}
