// Path-tree router and middleware chain composition (spec §4.5).
//
// The actual path-segment matching (literal vs `{param}` nodes, O(depth)
// lookup, method-aware 404 vs 405) is axum's own router: axum compiles
// its route table into a radix tree with exactly the node kinds spec.md
// describes, and already returns 405 when a path matches but the method
// doesn't, 404 when no path matches. Reimplementing that tree here would
// duplicate, not replace, the teacher's own choice (qck-backend-core's
// `handlers::auth_routes`/`links_routes` build plain `axum::Router`s too)
// — this module is the seam that owns *composition*: which middleware
// wraps which routes, and in what order, per spec §4.5's registration
// list (recovery -> logger -> CORS -> CSRF -> auth -> rate-limit ->
// handler). `Router::layer` applies outermost-last, so the list below is
// written innermost-first and reversed by stacking `.layer()` calls in
// reverse order — each layer's pre-logic then runs in the spec's order
// and its post-logic unwinds in the reverse (onion semantics, spec §5).

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::app::AppState;
use crate::handlers::auth as auth_handlers;
use crate::middleware::{
    cors_middleware, csrf_middleware, logger_middleware, optional_auth, rate_limit_middleware,
    recovery_layer, require_auth,
};

/// Public, unauthenticated auth endpoints (spec §6).
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth_handlers::login))
        .route("/refresh", post(auth_handlers::refresh))
        .route("/logout", post(auth_handlers::logout))
        .route("/password/request", post(auth_handlers::request_password_reset))
        .route("/password/reset", post(auth_handlers::reset_password))
}

/// Routes that require a verified access token. `require_auth` sits
/// innermost, closest to the handler — by the time a request reaches
/// here the global chain has already run `optional_auth` once (see
/// `build`), so this only needs to turn "no/invalid token" into a hard
/// 401 rather than redo verification.
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(auth_handlers::current_user))
        .route_layer(axum_middleware::from_fn_with_state(state, require_auth))
}

/// Assembles the full application router: route table plus the
/// recovery -> logger -> CORS -> CSRF -> auth -> rate-limit -> handler
/// chain (spec §4.5). `Router::layer` makes each call the new outermost
/// wrapper, so layers are added innermost-first here (rate-limit first,
/// recovery last) to produce that execution order. `optional_auth` runs
/// globally, ahead of `rate_limit_middleware`, so a `TokenUser` is
/// already bound into the request by the time the per-user rate-limit
/// key is computed — for routes that must reject an absent/invalid
/// token outright, `protected_routes` layers `require_auth` in addition,
/// closest to its own handlers.
pub fn build(state: AppState) -> Router<()> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/api", protected_routes(state.clone()))
        .layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), optional_auth))
        .layer(axum_middleware::from_fn_with_state(state.clone(), csrf_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), cors_middleware))
        .layer(axum_middleware::from_fn(logger_middleware))
        .layer(axum_middleware::from_fn(recovery_layer))
        .with_state(state)
}
