// Key material construction for the JWT manager, adapted from the
// teacher's JwtConfig (which only ever built an HS256 pair) to cover the
// HS/RS/ES families plus a `kid -> verification key` rotation map.

use std::collections::HashMap;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use super::JwtError;
use crate::config::JwtSettings;

#[derive(Clone)]
pub struct JwtConfig {
    pub algorithm: Algorithm,
    pub access_token_expiry_secs: u64,
    pub refresh_token_expiry_secs: u64,
    /// `kid` embedded in the header of tokens this instance signs.
    pub signing_kid: Option<String>,
    pub(crate) encoding_key: EncodingKey,
    pub(crate) default_decoding_key: DecodingKey,
    pub(crate) rotation_keys: HashMap<String, DecodingKey>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithm", &self.algorithm)
            .field("access_token_expiry_secs", &self.access_token_expiry_secs)
            .field("refresh_token_expiry_secs", &self.refresh_token_expiry_secs)
            .field("signing_kid", &self.signing_kid)
            .field("encoding_key", &"<redacted>")
            .field("default_decoding_key", &"<redacted>")
            .field("rotation_keys", &self.rotation_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn parse_algorithm(signing_method: &str) -> Result<Algorithm, JwtError> {
    match signing_method {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        other => Err(JwtError::Config(format!(
            "unsupported signing method: {other}"
        ))),
    }
}

fn decoding_key_for(algorithm: Algorithm, key_material: &str) -> Result<DecodingKey, JwtError> {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Ok(DecodingKey::from_secret(key_material.as_bytes()))
        }
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            DecodingKey::from_rsa_pem(key_material.as_bytes())
                .map_err(|e| JwtError::Config(format!("invalid RSA public key: {e}")))
        }
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key_material.as_bytes())
            .map_err(|e| JwtError::Config(format!("invalid EC public key: {e}"))),
        other => Err(JwtError::Config(format!(
            "unsupported signing family: {other:?}"
        ))),
    }
}

impl JwtConfig {
    pub fn new(settings: &JwtSettings) -> Result<Self, JwtError> {
        let algorithm = parse_algorithm(&settings.signing_method)?;

        let (encoding_key, default_decoding_key, signing_kid) = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = settings
                    .secret
                    .as_ref()
                    .ok_or_else(|| JwtError::Config("JWT_SECRET is required for HS family".into()))?;
                (
                    EncodingKey::from_secret(secret.as_bytes()),
                    DecodingKey::from_secret(secret.as_bytes()),
                    None,
                )
            }
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                let private_pem = settings.private_key_pem.as_ref().ok_or_else(|| {
                    JwtError::Config("JWT_PRIVATE_KEY is required for RS family".into())
                })?;
                let public_pem = settings.public_key_pem.as_ref().ok_or_else(|| {
                    JwtError::Config("JWT_PUBLIC_KEY is required for RS family".into())
                })?;
                let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::Config(format!("invalid RSA private key: {e}")))?;
                let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::Config(format!("invalid RSA public key: {e}")))?;
                (encoding_key, decoding_key, None)
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                let private_pem = settings.private_key_pem.as_ref().ok_or_else(|| {
                    JwtError::Config("JWT_PRIVATE_KEY is required for ES family".into())
                })?;
                let public_pem = settings.public_key_pem.as_ref().ok_or_else(|| {
                    JwtError::Config("JWT_PUBLIC_KEY is required for ES family".into())
                })?;
                let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::Config(format!("invalid EC private key: {e}")))?;
                let decoding_key = DecodingKey::from_ec_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::Config(format!("invalid EC public key: {e}")))?;
                (encoding_key, decoding_key, None)
            }
            other => return Err(JwtError::Config(format!("unsupported family: {other:?}"))),
        };

        let mut rotation_keys = HashMap::new();
        for (kid, material) in &settings.rotation_keys {
            rotation_keys.insert(kid.clone(), decoding_key_for(algorithm, material)?);
        }

        Ok(Self {
            algorithm,
            access_token_expiry_secs: settings.access_token_expiry_secs,
            refresh_token_expiry_secs: settings.refresh_token_expiry_secs,
            signing_kid,
            encoding_key,
            default_decoding_key,
            rotation_keys,
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn for_test() -> Self {
        let secret = "test-signing-secret";
        Self {
            algorithm: Algorithm::HS256,
            access_token_expiry_secs: 900,
            refresh_token_expiry_secs: 604_800,
            signing_kid: None,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            default_decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            rotation_keys: HashMap::new(),
        }
    }

    /// Selects the verification key for `kid`, falling back to the
    /// default key when `kid` is absent or unknown (an unknown kid on a
    /// currently-signing key is not an error: it may be the active key
    /// itself, which never appears in the rotation map).
    pub(crate) fn decoding_key_for_kid(&self, kid: Option<&str>) -> &DecodingKey {
        match kid.and_then(|k| self.rotation_keys.get(k)) {
            Some(key) => key,
            None => &self.default_decoding_key,
        }
    }
}
