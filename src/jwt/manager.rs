// Access/refresh token issuance and verification. Grounded on the
// teacher's JwtService::{generate_access_token, generate_refresh_token,
// validate_access_token, validate_refresh_token}, generalized to the
// HS/RS/ES families and `kid`-based rotation via JwtConfig, and to the
// `typ` header discrimination this spec requires that the teacher's
// tokens don't carry.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, decode_header, encode, Header, Validation};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::claims::{AccessTokenClaims, RefreshTokenClaims, ACCESS_TOKEN_TYP, REFRESH_TOKEN_TYP};
use super::config::JwtConfig;
use super::{JwtError, TokenErrorKind};

pub struct JwtManager {
    config: JwtConfig,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> JwtError {
    use jsonwebtoken::errors::ErrorKind;
    let kind = match e.kind() {
        ErrorKind::ExpiredSignature => TokenErrorKind::Expired,
        ErrorKind::InvalidSignature => TokenErrorKind::BadSignature,
        _ => TokenErrorKind::Invalid,
    };
    JwtError::Token { kind }
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    fn signing_header(&self, typ: &str) -> Header {
        let mut header = Header::new(self.config.algorithm);
        header.typ = Some(typ.to_string());
        header.kid = self.config.signing_kid.clone();
        header
    }

    fn base_validation(&self) -> Validation {
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation
    }

    /// Issues a fresh access token bound to `session_id`. `extra_claims`
    /// is merged in but never allowed to override the reserved claim
    /// names above (serde's `flatten` would silently let a later key win,
    /// so reserved names are stripped from `extra` before merge).
    pub fn generate_access_token(
        &self,
        user_id: &str,
        email: &str,
        session_id: &str,
        mut extra_claims: Map<String, Value>,
    ) -> Result<String, JwtError> {
        for reserved in ["sub", "sid", "jti", "email", "iat", "nbf", "exp"] {
            extra_claims.remove(reserved);
        }

        let now = now_secs();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            email: email.to_string(),
            iat: now,
            nbf: now,
            exp: now + self.config.access_token_expiry_secs,
            extra: extra_claims,
        };

        encode(&self.signing_header(ACCESS_TOKEN_TYP), &claims, &self.config.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    pub fn generate_refresh_token(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<String, JwtError> {
        let now = now_secs();
        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: now,
            exp: now + self.config.refresh_token_expiry_secs,
        };

        encode(&self.signing_header(REFRESH_TOKEN_TYP), &claims, &self.config.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verifies an access token: signature, `exp`/`nbf`, and that
    /// `typ = "at+jwt"`. Rejects algorithm confusion because
    /// `Validation::new` pins the single accepted algorithm.
    pub fn verify_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let header = decode_header(token).map_err(|_| JwtError::Token {
            kind: TokenErrorKind::Invalid,
        })?;
        let key = self.config.decoding_key_for_kid(header.kid.as_deref());
        let validation = self.base_validation();

        let token_data = decode::<AccessTokenClaims>(token, key, &validation)
            .map_err(map_decode_error)?;

        if token_data.header.typ.as_deref() != Some(ACCESS_TOKEN_TYP) {
            return Err(JwtError::Token {
                kind: TokenErrorKind::WrongType,
            });
        }

        Ok(token_data.claims)
    }

    /// Verifies a refresh token and returns `(userID, sessionID)`.
    pub fn verify_refresh_token(&self, token: &str) -> Result<(String, String), JwtError> {
        let header = decode_header(token).map_err(|_| JwtError::Token {
            kind: TokenErrorKind::Invalid,
        })?;
        let key = self.config.decoding_key_for_kid(header.kid.as_deref());
        let validation = self.base_validation();

        let token_data = decode::<RefreshTokenClaims>(token, key, &validation)
            .map_err(map_decode_error)?;

        if token_data.header.typ.as_deref() != Some(REFRESH_TOKEN_TYP) {
            return Err(JwtError::Token {
                kind: TokenErrorKind::WrongType,
            });
        }

        Ok((token_data.claims.sub, token_data.claims.sid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new(JwtConfig::for_test())
    }

    #[test]
    fn issue_then_verify_round_trips_claims() {
        let mgr = manager();
        let mut extra = Map::new();
        extra.insert("role".into(), Value::String("admin".into()));

        let token = mgr
            .generate_access_token("user-1", "a@example.com", "sess-1", extra)
            .unwrap();
        let claims = mgr.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.sid, "sess-1");
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.extra.get("role").unwrap(), "admin");
    }

    #[test]
    fn extra_claims_cannot_override_reserved_names() {
        let mgr = manager();
        let mut extra = Map::new();
        extra.insert("sub".into(), Value::String("attacker".into()));

        let token = mgr
            .generate_access_token("user-1", "a@example.com", "sess-1", extra)
            .unwrap();
        let claims = mgr.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn refresh_token_rejected_by_access_verifier() {
        let mgr = manager();
        let refresh = mgr.generate_refresh_token("user-1", "sess-1").unwrap();

        let err = mgr.verify_token(&refresh).unwrap_err();
        assert_eq!(err.kind(), Some(TokenErrorKind::WrongType));
    }

    #[test]
    fn access_token_rejected_by_refresh_verifier() {
        let mgr = manager();
        let access = mgr
            .generate_access_token("user-1", "a@example.com", "sess-1", Map::new())
            .unwrap();

        let err = mgr.verify_refresh_token(&access).unwrap_err();
        assert_eq!(err.kind(), Some(TokenErrorKind::WrongType));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let mgr = manager();
        let token = mgr
            .generate_access_token("user-1", "a@example.com", "sess-1", Map::new())
            .unwrap();
        let mut tampered = token.clone();
        tampered.push('x');

        let err = mgr.verify_token(&tampered).unwrap_err();
        assert!(matches!(
            err.kind(),
            Some(TokenErrorKind::Invalid) | Some(TokenErrorKind::BadSignature)
        ));
    }

    #[test]
    fn refresh_round_trip_returns_user_and_session() {
        let mgr = manager();
        let token = mgr.generate_refresh_token("user-7", "sess-7").unwrap();
        let (user_id, session_id) = mgr.verify_refresh_token(&token).unwrap();
        assert_eq!(user_id, "user-7");
        assert_eq!(session_id, "sess-7");
    }
}
