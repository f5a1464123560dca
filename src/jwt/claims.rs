// Claim shapes for access and refresh tokens. Grounded on the teacher's
// models::auth::{AccessTokenClaims, RefreshTokenClaims}, extended with
// `sid` (session id) and `nbf`, which the teacher's tokens don't carry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub sid: String,
    pub jti: String,
    pub email: String,
    pub iat: u64,
    pub nbf: u64,
    pub exp: u64,
    /// Application-provided extra claims merged in at issuance. Reserved
    /// claim names above always win if an extra claim collides.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub sid: String,
    pub jti: String,
    pub iat: u64,
    pub nbf: u64,
    pub exp: u64,
}

pub const ACCESS_TOKEN_TYP: &str = "at+jwt";
pub const REFRESH_TOKEN_TYP: &str = "rt+jwt";
