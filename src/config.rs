// Centralized configuration loading, following the teacher's
// load-everything-once-at-startup pattern (formerly app_config.rs).
//
// spec.md treats configuration loading itself as an external collaborator:
// the core components (JwtManager, AuthService, RateLimiter, DatabaseFacade)
// never read environment variables themselves, they take explicit config
// structs in their constructors. AppConfig exists purely so the `auth-core`
// binary and the test harness have something to build those structs from.

use std::collections::HashMap;
use std::env;

use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global configuration, loaded once. Only the binary entry point and
/// integration tests touch this; library code always takes explicit
/// config structs instead.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("failed to load configuration")
});

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtSettings,
    pub rate_limit: RateLimitSettings,
    pub cors: CorsSettings,
    pub csrf: CsrfSettings,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub write_host: String,
    pub read_hosts: Vec<String>,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_conns: u32,
    pub ssl_mode: SslMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Require,
    Prefer,
    Allow,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "disable" => Ok(Self::Disable),
            "require" => Ok(Self::Require),
            "prefer" => Ok(Self::Prefer),
            "allow" => Ok(Self::Allow),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(ConfigError::InvalidValue(
                "DB_SSL_MODE".to_string(),
                other.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub signing_method: String,
    pub secret: Option<String>,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
    pub access_token_expiry_secs: u64,
    pub refresh_token_expiry_secs: u64,
    /// `kid -> key material` used only to verify tokens signed under a
    /// retired key during rotation; never used for signing. HS entries are
    /// the raw shared secret, RS/ES entries are a PEM public key.
    pub rotation_keys: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub per_ip: u32,
    pub per_user: u32,
    pub reset_period_secs: u32,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CsrfSettings {
    pub enabled: bool,
    pub exempt_paths: Vec<String>,
    pub token_length: usize,
    pub cookie_name: String,
    pub header_name: String,
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env_var(name) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), v)),
    }
}

fn env_csv(name: &str) -> Vec<String> {
    env_var(name)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default()
}

/// Parses `JWT_ROTATION_KEYS`, a `;;`-separated list of `kid::key` pairs.
/// PEM material embeds literal `\n` escapes (real newlines don't survive
/// most env var transports) which are unescaped here.
fn parse_rotation_keys(name: &str) -> HashMap<String, String> {
    env_var(name)
        .map(|raw| {
            raw.split(";;")
                .filter(|entry| !entry.is_empty())
                .filter_map(|entry| entry.split_once("::"))
                .map(|(kid, key)| (kid.to_string(), key.replace("\\n", "\n")))
                .collect()
        })
        .unwrap_or_default()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rate_limit = RateLimitSettings {
            enabled: env_parse("RATE_LIMIT_ENABLED", true)?,
            per_ip: env_parse("RATE_LIMIT_PER_IP", 60)?,
            per_user: env_parse("RATE_LIMIT_PER_USER", 120)?,
            reset_period_secs: env_parse("RATE_LIMIT_RESET_PERIOD", 60)?,
        };
        if rate_limit.reset_period_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_RESET_PERIOD".to_string(),
                "0".to_string(),
            ));
        }

        let signing_method = env_or("JWT_SIGNING_METHOD", "HS256");
        let secret = env_var("JWT_SECRET");
        let private_key_pem = env_var("JWT_PRIVATE_KEY");
        let public_key_pem = env_var("JWT_PUBLIC_KEY");
        if signing_method.starts_with("HS") && secret.is_none() {
            return Err(ConfigError::MissingVar("JWT_SECRET".to_string()));
        }
        if signing_method.starts_with("RS") || signing_method.starts_with("ES") {
            if private_key_pem.is_none() {
                return Err(ConfigError::MissingVar("JWT_PRIVATE_KEY".to_string()));
            }
            if public_key_pem.is_none() {
                return Err(ConfigError::MissingVar("JWT_PUBLIC_KEY".to_string()));
            }
        }

        Ok(Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT", 8080)?,
                read_timeout_secs: env_parse("SERVER_READ_TIMEOUT", 15)?,
                write_timeout_secs: env_parse("SERVER_WRITE_TIMEOUT", 15)?,
            },
            database: DatabaseConfig {
                write_host: env_or("DB_WRITE_HOST", "localhost"),
                read_hosts: env_csv("DB_READ_HOSTS"),
                port: env_parse("DB_PORT", 5432)?,
                name: env_or("DB_NAME", "auth_core"),
                user: env_or("DB_USER", "postgres"),
                password: env_or("DB_PASSWORD", ""),
                max_conns: env_parse("DB_MAX_CONNS", 10)?,
                ssl_mode: SslMode::parse(&env_or("DB_SSL_MODE", "prefer"))?,
            },
            jwt: JwtSettings {
                signing_method,
                secret,
                private_key_pem,
                public_key_pem,
                access_token_expiry_secs: env_parse("JWT_ACCESS_TOKEN_EXPIRY", 900)?,
                refresh_token_expiry_secs: env_parse("JWT_REFRESH_TOKEN_EXPIRY", 604_800)?,
                rotation_keys: parse_rotation_keys("JWT_ROTATION_KEYS"),
            },
            rate_limit,
            cors: CorsSettings {
                allowed_origins: env_csv("CORS_ALLOWED_ORIGINS"),
                allowed_methods: {
                    let v = env_csv("CORS_ALLOWED_METHODS");
                    if v.is_empty() {
                        vec![
                            "GET".into(),
                            "POST".into(),
                            "PUT".into(),
                            "DELETE".into(),
                            "OPTIONS".into(),
                        ]
                    } else {
                        v
                    }
                },
                allowed_headers: {
                    let v = env_csv("CORS_ALLOWED_HEADERS");
                    if v.is_empty() {
                        vec!["Content-Type".into(), "Authorization".into()]
                    } else {
                        v
                    }
                },
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", false)?,
                max_age_secs: env_parse("CORS_MAX_AGE", 3600)?,
            },
            csrf: CsrfSettings {
                enabled: env_parse("CSRF_ENABLED", true)?,
                exempt_paths: env_csv("CSRF_EXEMPT_PATHS"),
                token_length: env_parse("CSRF_TOKEN_LENGTH", 32)?,
                cookie_name: env_or("CSRF_COOKIE_NAME", "csrf_token"),
                header_name: env_or("CSRF_HEADER_NAME", "X-CSRF-Token"),
            },
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn for_test() -> Self {
        Self {
            server: ServerConfig {
                port: 0,
                read_timeout_secs: 15,
                write_timeout_secs: 15,
            },
            database: DatabaseConfig {
                write_host: "localhost".into(),
                read_hosts: vec![],
                port: 5432,
                name: "auth_core_test".into(),
                user: "postgres".into(),
                password: String::new(),
                max_conns: 5,
                ssl_mode: SslMode::Disable,
            },
            jwt: JwtSettings {
                signing_method: "HS256".into(),
                secret: Some("test-secret".into()),
                private_key_pem: None,
                public_key_pem: None,
                access_token_expiry_secs: 900,
                refresh_token_expiry_secs: 604_800,
                rotation_keys: HashMap::new(),
            },
            rate_limit: RateLimitSettings {
                enabled: true,
                per_ip: 60,
                per_user: 120,
                reset_period_secs: 60,
            },
            cors: CorsSettings {
                allowed_origins: vec!["https://example.com".into()],
                allowed_methods: vec!["GET".into(), "POST".into()],
                allowed_headers: vec!["Content-Type".into()],
                allow_credentials: false,
                max_age_secs: 600,
            },
            csrf: CsrfSettings {
                enabled: true,
                exempt_paths: vec![],
                token_length: 32,
                cookie_name: "csrf_token".into(),
                header_name: "X-CSRF-Token".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_reset_period() {
        std::env::set_var("RATE_LIMIT_RESET_PERIOD", "0");
        std::env::set_var("JWT_SECRET", "x");
        let result = AppConfig::from_env();
        std::env::remove_var("RATE_LIMIT_RESET_PERIOD");
        std::env::remove_var("JWT_SECRET");
        assert!(result.is_err());
    }

    #[test]
    fn requires_jwt_secret_for_hs_family() {
        std::env::remove_var("JWT_SECRET");
        std::env::set_var("JWT_SIGNING_METHOD", "HS256");
        let result = AppConfig::from_env();
        std::env::remove_var("JWT_SIGNING_METHOD");
        assert!(result.is_err());
    }
}
