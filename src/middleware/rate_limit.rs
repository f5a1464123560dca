// Per-IP then per-user fixed-window rate limiting (spec §4.4). Fail-open:
// a store error is logged and the request allowed through, since the
// limiter is a defensive layer, not an authorization gate. Client IP is
// derived by the precedence `X-Forwarded-For[0] -> X-Real-IP -> RemoteAddr`.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app::AppState;
use crate::context::TokenUser;
use crate::error::ApiError;

fn client_ip(req: &Request<Body>, remote: SocketAddr) -> String {
    if let Some(xff) = req.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(real_ip) = req.headers().get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    remote.ip().to_string()
}

async fn check(state: &AppState, key: &str, limit: u32, period_secs: u32) -> Option<Response> {
    match state.rate_limiter.incr(key, Duration::from_secs(period_secs as u64)).await {
        Ok(count) if count > limit => Some(
            ApiError::TooManyRequests {
                retry_after_secs: period_secs as u64,
            }
            .into_response(),
        ),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, key = %key, "rate limit store error, failing open");
            None
        }
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let settings = &state.config.rate_limit;
    if !settings.enabled {
        return next.run(req).await;
    }

    let ip_key = format!("ip:{}", client_ip(&req, remote));
    if let Some(rejected) = check(&state, &ip_key, settings.per_ip, settings.reset_period_secs).await {
        return rejected;
    }

    if let Some(user) = req.extensions().get::<TokenUser>() {
        let user_key = format!("user:{}", user.id);
        if let Some(rejected) = check(&state, &user_key, settings.per_user, settings.reset_period_secs).await {
            return rejected;
        }
    }

    next.run(req).await
}
