// End-to-end exercises of the router + middleware chain against the
// in-memory store backends (see tests/common/mod.rs). Drives the full
// `axum::Router` through `tower::ServiceExt::oneshot` rather than calling
// service functions directly, so the middleware chain's ordering (CSRF,
// auth, rate limiting) is under test along with the handlers themselves.

mod common;

use std::net::SocketAddr;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{test_state, test_user};

fn peer() -> SocketAddr {
    "127.0.0.1:54321".parse().unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// `rate_limit_middleware` extracts `ConnectInfo<SocketAddr>`, which is
// only populated by `into_make_service_with_connect_info` on a real
// listener. Driving the router directly through `oneshot` means every
// request needs that extension inserted by hand.
fn with_peer(mut req: Request<Body>) -> Request<Body> {
    req.extensions_mut().insert(ConnectInfo(peer()));
    req
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    with_peer(
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
}

#[tokio::test]
async fn login_then_refresh_rotates_and_invalidates_old_token() {
    let user = test_user("alice@example.com", "correct horse battery staple");
    let mut state = test_state(vec![user], 1000);
    exempt_auth_paths(&mut state);
    let app = auth_core::router::build(state);

    let login_req = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "alice@example.com", "password": "correct horse battery staple" }),
    );
    let response = app.clone().oneshot(login_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();
    assert!(body["access_token"].as_str().unwrap().len() > 10);

    let refresh_req = json_request(
        "POST",
        "/auth/refresh",
        json!({ "refresh_token": refresh_token }),
    );
    let response = app.clone().oneshot(refresh_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let new_refresh_token = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh_token, refresh_token);

    let reuse_req = json_request(
        "POST",
        "/auth/refresh",
        json!({ "refresh_token": refresh_token }),
    );
    let response = app.clone().oneshot(reuse_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let user = test_user("bob@example.com", "hunter2hunter2");
    let mut state = test_state(vec![user], 1000);
    exempt_auth_paths(&mut state);
    let app = auth_core::router::build(state);

    let req = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "bob@example.com", "password": "wrong" }),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_invalidates_the_session_for_live_access_tokens() {
    let user = test_user("carol@example.com", "supersecretpassword");
    let mut state = test_state(vec![user], 1000);
    exempt_auth_paths(&mut state);
    let app = auth_core::router::build(state);

    let login_req = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "carol@example.com", "password": "supersecretpassword" }),
    );
    let response = app.clone().oneshot(login_req).await.unwrap();
    let body = body_json(response).await;
    let access_token = body["access_token"].as_str().unwrap().to_string();
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let me_req = with_peer(
        Request::builder()
            .method("GET")
            .uri("/api/me")
            .header("authorization", format!("Bearer {access_token}"))
            .body(Body::empty())
            .unwrap(),
    );
    let response = app.clone().oneshot(me_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let logout_req = json_request("POST", "/auth/logout", json!({ "refresh_token": refresh_token }));
    let response = app.clone().oneshot(logout_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let me_req_again = with_peer(
        Request::builder()
            .method("GET")
            .uri("/api/me")
            .header("authorization", format!("Bearer {access_token}"))
            .body(Body::empty())
            .unwrap(),
    );
    let response = app.oneshot(me_req_again).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() {
    let mut state = test_state(vec![], 1000);
    exempt_auth_paths(&mut state);
    let app = auth_core::router::build(state);

    let req = with_peer(
        Request::builder()
            .method("GET")
            .uri("/api/me")
            .body(Body::empty())
            .unwrap(),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn csrf_mismatch_on_unsafe_method_is_rejected() {
    let user = test_user("dana@example.com", "anotherlongpassword");
    let state = test_state(vec![user], 1000);
    // Deliberately leave CSRF enforced (no exempt paths) for this test.
    let app = auth_core::router::build(state);

    let req = with_peer(
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .header("cookie", "csrf_token=aaaa")
            .header("x-csrf-token", "bbbb")
            .body(Body::from(
                json!({ "email": "dana@example.com", "password": "anotherlongpassword" }).to_string(),
            ))
            .unwrap(),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::from_u16(419).unwrap());
}

#[tokio::test]
async fn csrf_matching_double_submit_is_accepted() {
    let user = test_user("erin@example.com", "yetanotherpassword1");
    let state = test_state(vec![user], 1000);
    let app = auth_core::router::build(state);

    let req = with_peer(
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .header("cookie", "csrf_token=matching-token")
            .header("x-csrf-token", "matching-token")
            .body(Body::from(
                json!({ "email": "erin@example.com", "password": "yetanotherpassword1" }).to_string(),
            ))
            .unwrap(),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn per_ip_rate_limit_returns_429_with_retry_after() {
    let user = test_user("frank@example.com", "ratelimitedpassword1");
    let mut state = test_state(vec![user], 1);
    exempt_auth_paths(&mut state);
    let app = auth_core::router::build(state);

    let first = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "frank@example.com", "password": "wrong" }),
    );
    let response = app.clone().oneshot(first).await.unwrap();
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let second = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "frank@example.com", "password": "wrong" }),
    );
    let response = app.oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
}

#[tokio::test]
async fn password_reset_round_trip_issues_new_credentials() {
    let user = test_user("grace@example.com", "originalpassword1");
    let mut state = test_state(vec![user], 1000);
    exempt_auth_paths(&mut state);
    let app = auth_core::router::build(state);

    let req = json_request(
        "POST",
        "/auth/password/request",
        json!({ "email": "grace@example.com" }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let reset_token = body["reset_token"].as_str().unwrap().to_string();

    let confirm = json_request(
        "POST",
        "/auth/password/reset",
        json!({ "token": reset_token, "new_password": "brandnewpassword1" }),
    );
    let response = app.clone().oneshot(confirm).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let old_login = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "grace@example.com", "password": "originalpassword1" }),
    );
    let response = app.clone().oneshot(old_login).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let new_login = json_request(
        "POST",
        "/auth/login",
        json!({ "email": "grace@example.com", "password": "brandnewpassword1" }),
    );
    let response = app.oneshot(new_login).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

fn exempt_auth_paths(state: &mut auth_core::AppState) {
    let mut config = (*state.config).clone();
    config.csrf.exempt_paths = vec![
        "/auth/login".to_string(),
        "/auth/refresh".to_string(),
        "/auth/logout".to_string(),
        "/auth/password/request".to_string(),
        "/auth/password/reset".to_string(),
    ];
    state.config = std::sync::Arc::new(config);
}
