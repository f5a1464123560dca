pub mod claims;
pub mod config;
pub mod manager;

pub use claims::{AccessTokenClaims, RefreshTokenClaims, ACCESS_TOKEN_TYP, REFRESH_TOKEN_TYP};
pub use config::JwtConfig;
pub use manager::JwtManager;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    Invalid,
    Expired,
    WrongType,
    BadSignature,
}

impl std::fmt::Display for TokenErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::WrongType => "wrong-type",
            Self::BadSignature => "bad-signature",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("invalid key material: {0}")]
    Config(String),

    #[error("token error: {kind}")]
    Token { kind: TokenErrorKind },

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl JwtError {
    pub fn kind(&self) -> Option<TokenErrorKind> {
        match self {
            JwtError::Token { kind } => Some(*kind),
            _ => None,
        }
    }
}
