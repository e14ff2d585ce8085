//! HTTP middleware
//!
//! Two admission layers and a request logger:
//! - `auth_middleware` resolves a request identity from a bearer token or an
//!   API key and attaches it to the request
//! - `admin_middleware` guards the management routes, accepting admin bearer
//!   tokens exclusively
//! - `logging_middleware` logs method, path, status, and latency

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

use crate::models::Principal;

use super::router::AppState;

/// Paths that skip identity resolution entirely
const AUTH_SKIP_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/logout",
    "/api/health",
    "/api/admin/login",
];

/// Header carrying an API key
const API_KEY_HEADER: &str = "x-api-key";

/// Resolved identity attached to authorized requests
#[derive(Clone, Debug)]
pub struct AuthenticatedPrincipal(pub Principal);

/// The raw API key a request authenticated with, when it did
#[derive(Clone, Debug)]
pub struct PresentedApiKey(pub String);

/// Extract the bearer token from the Authorization header, if present
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Extract an API key from the `X-API-Key` header or the `key` query parameter
fn api_key_from_request(request: &Request) -> Option<String> {
    if let Some(key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
    {
        return Some(key.to_string());
    }

    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("key="))
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string())
}

/// Identity resolution middleware for the general API surface
///
/// Order of resolution: public-path skip, disabled-auth bypass, bearer token,
/// API key (header, then query parameter). A request that resolves nothing
/// is rejected with 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthFailure> {
    let path = request.uri().path();

    if AUTH_SKIP_PATHS.iter().any(|p| path.starts_with(p)) {
        return Ok(next.run(request).await);
    }

    if !state.auth_enabled && !state.api_key_enabled {
        return Ok(next.run(request).await);
    }

    if let Some(token) = bearer_token(&request) {
        if let Ok(claims) = state.signer.verify(token) {
            request
                .extensions_mut()
                .insert(AuthenticatedPrincipal(Principal::Token {
                    subject: claims.sub,
                    is_admin: claims.is_admin,
                }));
            return Ok(next.run(request).await);
        }
    }

    if state.api_key_enabled {
        if let Some(key) = api_key_from_request(&request) {
            match state.keys.validate_key(&key).await {
                Ok(true) => {
                    request
                        .extensions_mut()
                        .insert(AuthenticatedPrincipal(Principal::ApiKey));
                    request.extensions_mut().insert(PresentedApiKey(key));
                    return Ok(next.run(request).await);
                }
                Ok(false) => return Err(AuthFailure::auth_required()),
                Err(e) => {
                    tracing::error!(error = %e, "API key validation failed");
                    return Err(AuthFailure::key_persistence());
                }
            }
        }
    }

    Err(AuthFailure::auth_required())
}

/// Admission middleware for the admin management routes
///
/// Accepts bearer tokens only. A missing token and an invalid token are both
/// 401 with distinct codes; a valid non-admin token is 403.
pub async fn admin_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthFailure> {
    let token = bearer_token(&request).ok_or_else(AuthFailure::admin_token_required)?;

    let claims = state
        .signer
        .verify(token)
        .map_err(|_| AuthFailure::admin_token_invalid())?;

    if !claims.is_admin {
        return Err(AuthFailure::admin_permission_required());
    }

    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(Principal::Token {
            subject: claims.sub,
            is_admin: true,
        }));

    Ok(next.run(request).await)
}

/// Admission failure response carrying a stable machine-readable code
pub struct AuthFailure {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl AuthFailure {
    pub fn auth_required() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Authentication required".to_string(),
            code: "AUTH_REQUIRED",
        }
    }

    pub fn admin_token_required() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Admin token required".to_string(),
            code: "ADMIN_TOKEN_REQUIRED",
        }
    }

    pub fn admin_token_invalid() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid or expired admin token".to_string(),
            code: "ADMIN_TOKEN_INVALID",
        }
    }

    pub fn admin_permission_required() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: "Admin privileges required".to_string(),
            code: "ADMIN_PERMISSION_REQUIRED",
        }
    }

    fn key_persistence() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Failed to update API key".to_string(),
            code: "APIKEY_UPDATE_FAILED",
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// Request completion logging
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}
