// Panic recovery. Axum aborts the connection on an unhandled panic
// inside a handler; this middleware runs the rest of the chain on a
// spawned task so a panic surfaces as a `JoinError` instead, which is
// caught and turned into a 500 with a JSON body, the way the teacher's
// middleware module logs `{path, method, err}` on the failure path.

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

pub async fn recovery_layer(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let handle = tokio::spawn(async move { next.run(req).await });

    match handle.await {
        Ok(response) => response,
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                "panic".to_string()
            } else {
                "cancelled".to_string()
            };
            error!(path = %path, method = %method, err = %reason, "request handler failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "internal server error" })),
            )
                .into_response()
        }
    }
}
