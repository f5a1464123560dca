// CORS, grounded on the teacher's `middleware::cors::dynamic_cors_middleware`
// (origin echo vs whitelist, preflight short-circuit) rewritten against
// `CorsSettings` instead of the teacher's ad hoc fields, and with the
// wildcard-vs-whitelist branch collapsed into one allow-list check since
// this crate has no staging/production distinction of its own.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;

fn allowed_origin(origins: &[String], requested: Option<&str>) -> Option<String> {
    let requested = requested?;
    if origins.iter().any(|o| o == "*") {
        return Some(requested.to_string());
    }
    origins
        .iter()
        .find(|o| o.as_str() == requested)
        .map(|o| o.to_string())
}

pub async fn cors_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let cors = &state.config.cors;
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allowed = allowed_origin(&cors.allowed_origins, origin.as_deref());

    let is_preflight =
        req.method() == Method::OPTIONS && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    if is_preflight {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        if let Some(origin) = &allowed {
            apply_cors_headers(response.headers_mut(), cors, origin);
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_str(&cors.allowed_methods.join(", ")).unwrap_or_else(|_| HeaderValue::from_static("")),
            );
            response.headers_mut().insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_str(&cors.max_age_secs.to_string()).unwrap(),
            );
        }
        return response;
    }

    let mut response = next.run(req).await;
    if let Some(origin) = &allowed {
        apply_cors_headers(response.headers_mut(), cors, origin);
    }
    response.into_response()
}

fn apply_cors_headers(headers: &mut axum::http::HeaderMap, cors: &crate::config::CorsSettings, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    if cors.allow_credentials {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    if let Ok(value) = HeaderValue::from_str(&cors.allowed_headers.join(", ")) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_rejects_all_origins() {
        assert_eq!(allowed_origin(&[], Some("https://evil.example")), None);
    }

    #[test]
    fn wildcard_echoes_requested_origin() {
        let origins = vec!["*".to_string()];
        assert_eq!(
            allowed_origin(&origins, Some("https://a.example")),
            Some("https://a.example".to_string())
        );
    }

    #[test]
    fn whitelist_rejects_non_matching_origin() {
        let origins = vec!["https://a.example".to_string()];
        assert_eq!(allowed_origin(&origins, Some("https://b.example")), None);
    }
}
