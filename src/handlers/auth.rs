// HTTP handlers for the canonical auth endpoints (spec §6). Grounded on
// the teacher's handlers::auth (request/response DTO shape, `Validate`
// derive usage, device-info extraction from `ConnectInfo`/`UserAgent`),
// rewritten against `AuthService` instead of `JwtService` directly.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::context::TokenUser;
use crate::error::ApiError;
use crate::models::password_reset::{ForgotPasswordRequest, ResetPasswordRequest};
use crate::models::refresh_token::DeviceInfo;
use crate::response::{CurrentUserResponse, MessageResponse, TokenPairResponse};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordResetRequestResponse {
    /// Present only so integration tests and the host app's own delivery
    /// path can read the raw token out of band; a real deployment would
    /// never surface this field over the network and would instead email
    /// it. Kept here because the core has no email transport of its own
    /// (spec §1: out of scope, external collaborator).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

fn device_info(headers: &HeaderMap, remote: SocketAddr) -> DeviceInfo {
    DeviceInfo {
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: Some(remote.ip().to_string()),
    }
}

fn validation_error(errors: validator::ValidationErrors) -> ApiError {
    let fields = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let message = errs
                .first()
                .and_then(|e| e.message.clone())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "invalid value".to_string());
            (field.to_string(), message)
        })
        .collect();
    ApiError::Validation(fields)
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let pair = state
        .auth_service
        .login(&req.email, &req.password, device_info(&headers, remote))
        .await?;

    let expires_in = state.config.jwt.access_token_expiry_secs;
    Ok(Json(TokenPairResponse::new(pair.access_token, pair.refresh_token, expires_in)))
}

pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .auth_service
        .refresh(&req.refresh_token, device_info(&headers, remote))
        .await?;

    let expires_in = state.config.jwt.access_token_expiry_secs;
    Ok(Json(TokenPairResponse::new(pair.access_token, pair.refresh_token, expires_in)))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.logout(&req.refresh_token).await?;
    Ok(Json(MessageResponse::new("logged out")))
}

/// Always returns 200 regardless of whether `email` resolves to a user
/// (spec §4.2: enumeration defense). `reset_token` is only populated
/// when the user exists.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let reset_token = state.auth_service.request_password_reset(&req.email).await?;
    Ok(Json(PasswordResetRequestResponse { reset_token }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    state
        .auth_service
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password updated")))
}

/// Demonstrates `RequireAuth` binding a `TokenUser` into the request
/// context (spec §4.5); not part of the canonical endpoint table in
/// spec §6, but every end-to-end scenario in spec §8 exercises a
/// protected route shaped exactly like this one.
pub async fn current_user(
    axum::Extension(user): axum::Extension<TokenUser>,
) -> impl IntoResponse {
    Json(CurrentUserResponse {
        id: user.id,
        email: user.email,
    })
}
