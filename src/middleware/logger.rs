// Request logger. Assigns an opaque request id (a v4 UUID, >=128 bits of
// entropy per spec §4.5) before any other middleware runs, and logs
// method/path/status/duration/request_id/remote_ip at completion,
// matching the fields the teacher's tracing setup emits around request
// handling.

use std::time::Instant;

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use tracing::info;
use uuid::Uuid;

use crate::context::RequestId;

pub async fn logger_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4().to_string());
    req.extensions_mut().insert(request_id.clone());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let remote_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        request_id = %request_id,
        remote_ip = %remote_ip,
        "request completed"
    );

    response
}
