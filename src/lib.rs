// auth-core: JWT session engine, rate limiter, request-governance
// middleware chain, and read/write-split database facade (spec.md §1-2).

pub mod app;
pub mod auth_service;
pub mod blocklist;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod response;
pub mod router;
pub mod telemetry;

pub use app::AppState;
pub use auth_service::{AuthService, ClaimsProvider, TokenPair};
pub use config::{AppConfig, ConfigError, CONFIG};
pub use context::{AuthUser, PathParams, RequestId, TokenUser};
pub use error::ApiError;
pub use jwt::{JwtConfig, JwtError, JwtManager};
