// Middleware chain: recovery -> logger -> cors -> csrf -> auth -> rate-limit
// -> handler (spec §4.5). Each middleware is an axum `from_fn` handler,
// the idiomatic axum equivalent of the teacher's
// `middleware::{cors, auth_middleware}` unary-function-over-handlers
// style; composing them through `Router::layer` in registration order
// gives the same onion semantics the spec calls for (the first-registered
// middleware's pre-logic runs first, its post-logic runs last).

pub mod auth;
pub mod cors;
pub mod csrf;
pub mod logger;
pub mod rate_limit;
pub mod recovery;

pub use auth::{optional_auth, require_auth};
pub use cors::cors_middleware;
pub use csrf::csrf_middleware;
pub use logger::logger_middleware;
pub use rate_limit::rate_limit_middleware;
pub use recovery::recovery_layer;
