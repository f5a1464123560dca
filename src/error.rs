// Unified error taxonomy for the request-governance core.
//
// Lower layers (db, jwt, models, rate_limit, blocklist) keep their own
// narrow thiserror enums. The auth service and HTTP layer are the only
// places that convert into `ApiError`, which is the only error type that
// ever reaches a response body.

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation error")]
    Validation(HashMap<String, String>),

    #[error("unauthorized")]
    Unauthorized(&'static str),

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict(String),

    #[error("csrf failure")]
    CsrfFailure,

    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::CsrfFailure => StatusCode::from_u16(419).unwrap(),
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message handed to the client. Credential-adjacent reasons
    /// collapse to a generic message here; the original `reason` is only
    /// ever logged, never serialized (see `ApiError::Unauthorized`'s log
    /// call sites in auth_service).
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(_) => "validation failed".to_string(),
            ApiError::Unauthorized(_) => "invalid credentials".to_string(),
            ApiError::Forbidden => "forbidden".to_string(),
            ApiError::NotFound => "not found".to_string(),
            ApiError::Conflict(msg) => msg.clone(),
            ApiError::CsrfFailure => "csrf token mismatch".to_string(),
            ApiError::TooManyRequests { .. } => "too many requests".to_string(),
            ApiError::Internal(_) => "internal server error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<HashMap<String, String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let ApiError::Internal(ref msg) = self {
            tracing::error!(error = %msg, "internal error");
        }

        let errors = match &self {
            ApiError::Validation(fields) => Some(fields.clone()),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorBody {
                message: self.public_message(),
                errors,
            }),
        )
            .into_response();

        if let ApiError::TooManyRequests { retry_after_secs } = self {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_str(&retry_after_secs.to_string()).unwrap(),
            );
        }

        response
    }
}
