// Per-request context plumbing: authenticated user, request id, path
// params. These live in the `http::Request` extensions map, the same
// place the teacher's `auth_middleware` stashes `AuthenticatedUser`
// (see src/middleware/auth.rs). No cross-request sharing is possible:
// everything here is owned by the single request it was inserted into.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Capability set a bound user value must satisfy. Keeping this as a
/// trait rather than a concrete struct means a host application's own
/// user type can also be bound into the context (spec.md §9: "Polymorphism
/// over the authenticated user").
pub trait AuthUser {
    fn id(&self) -> &str;
    fn email(&self) -> &str;
}

/// The value `RequireAuth`/`OptionalAuth` bind into the request context
/// after verifying an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUser {
    pub id: String,
    pub email: String,
    pub session_id: String,
    pub claims: serde_json::Value,
}

impl AuthUser for TokenUser {
    fn id(&self) -> &str {
        &self.id
    }

    fn email(&self) -> &str {
        &self.email
    }
}

/// Path parameters bound by the router, keyed by their declared name
/// (`:name` or `{name}`).
#[derive(Debug, Clone, Default)]
pub struct PathParams(pub HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Opaque request identifier, >=128 bits of entropy (a v4 UUID), assigned
/// by the logger middleware and placed in the context before any other
/// middleware runs.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extracts context values out of request extensions. Handlers and
/// middleware downstream of the relevant binder reach for these instead
/// of walking `request.extensions()` directly.
pub trait RequestContextExt {
    fn request_id(&self) -> Option<&RequestId>;
    fn path_params(&self) -> Option<&PathParams>;
    fn token_user(&self) -> Option<&TokenUser>;
}

impl RequestContextExt for axum::http::Request<axum::body::Body> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }

    fn path_params(&self) -> Option<&PathParams> {
        self.extensions().get::<PathParams>()
    }

    fn token_user(&self) -> Option<&TokenUser> {
        self.extensions().get::<TokenUser>()
    }
}
