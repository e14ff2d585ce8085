//! HTTP router and handlers
//!
//! Defines the axum router for the whole API surface: the admin login and
//! key-management routes, the user-facing login/verify routes, the
//! self-service key status route, and the health check. Handlers translate
//! typed domain errors into `{error, code}` JSON bodies with stable codes.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{AdminGate, TokenSigner};
use crate::error::{AuthError, KeyError};
use crate::keys::{is_api_key_format, ApiKeyService};

use super::middleware::{
    admin_middleware, auth_middleware, logging_middleware, AuthenticatedPrincipal, PresentedApiKey,
};

/// Subject minted for logins that authenticate with an API key
const API_KEY_LOGIN_SUBJECT: &str = "apikey_user";

/// Username that triggers the API-key login path
const API_KEY_LOGIN_USERNAME: &str = "user";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// API key lifecycle service
    pub keys: Arc<ApiKeyService>,

    /// Admin login gate
    pub gate: Arc<AdminGate>,

    /// Bearer token signer
    pub signer: Arc<TokenSigner>,

    /// Configured non-admin users, username to password
    pub users: Arc<HashMap<String, String>>,

    /// Whether bearer-token authentication is enforced
    pub auth_enabled: bool,

    /// Whether API-key authentication is accepted
    pub api_key_enabled: bool,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/api/admin/apikeys",
            get(list_keys_handler).post(create_key_handler),
        )
        .route(
            "/api/admin/apikeys/batch-create",
            post(batch_create_handler),
        )
        .route(
            "/api/admin/apikeys/batch-extend",
            post(batch_extend_handler),
        )
        .route(
            "/api/admin/apikeys/batch-delete",
            post(batch_delete_handler),
        )
        .route(
            "/api/admin/apikeys/:key",
            delete(delete_key_handler).put(update_key_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    let protected = Router::new()
        .route("/api/auth/verify", get(verify_handler))
        .route("/api/me/apikey", get(my_key_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/admin/login", post(admin_login_handler))
        .route("/api/auth/login", post(user_login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .merge(admin)
        .merge(protected)
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors_layer())
        .with_state(state)
}

/// Permissive CORS for the management UI
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// Request / response bodies
// =============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct AdminLoginRequest {
    password: String,
}

#[derive(Debug, Deserialize)]
struct UserLoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct CreateKeyRequest {
    ttl_hours: i64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct UpdateKeyRequest {
    expires_at: Option<DateTime<Utc>>,
    extend_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BatchCreateRequest {
    count: usize,
    ttl_hours: i64,
    #[serde(default = "default_batch_prefix")]
    description_prefix: String,
}

fn default_batch_prefix() -> String {
    "batch".to_string()
}

#[derive(Debug, Deserialize)]
struct BatchExtendRequest {
    keys: Vec<String>,
    extend_hours: i64,
}

#[derive(Debug, Deserialize)]
struct BatchDeleteRequest {
    keys: Vec<String>,
}

/// Self-service key status
#[derive(Debug, Serialize)]
struct KeyStatusResponse {
    key: String,
    status: &'static str,
    created_at: DateTime<Utc>,
    first_used_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    validity_days: i64,
    remaining_days: i64,
    description: String,
}

// =============================================================================
// Error mapping
// =============================================================================

/// Handler error response with a stable machine-readable code
struct ApiError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    /// Map a key operation error; `persistence_code` names the failed operation
    fn from_key_error(error: KeyError, persistence_code: &'static str) -> Self {
        match error {
            KeyError::Validation(msg) => {
                Self::new(StatusCode::BAD_REQUEST, msg, "INVALID_REQUEST")
            }
            KeyError::NotFound => Self::new(
                StatusCode::NOT_FOUND,
                "API key not found",
                "APIKEY_NOT_FOUND",
            ),
            KeyError::Persistence(msg) => {
                tracing::error!(error = %msg, "Key store operation failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Key store operation failed",
                    persistence_code,
                )
            }
        }
    }

    fn from_login_error(error: AuthError) -> Self {
        match error {
            AuthError::RateLimited => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts, try again later",
                "RATE_LIMIT_EXCEEDED",
            ),
            AuthError::NotConfigured(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Admin authentication is not configured",
                "ADMIN_NOT_CONFIGURED",
            ),
            AuthError::InvalidCredentials => Self::new(
                StatusCode::UNAUTHORIZED,
                "Invalid password",
                "ADMIN_LOGIN_FAILED",
            ),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate token",
                "TOKEN_GENERATION_FAILED",
            ),
        }
    }
}

impl IntoResponse for ApiError {
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

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Admin password login
async fn admin_login_handler(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let client_ip = addr
        .map(|ConnectInfo(a)| a.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let grant = state
        .gate
        .login(&req.password, client_ip)
        .map_err(ApiError::from_login_error)?;

    Ok(Json(LoginResponse {
        token: grant.token,
        expires_at: grant.expires_at,
    }))
}

/// User login: either a configured user, or an API key presented as the
/// password of the reserved `user` username
async fn user_login_handler(
    State(state): State<AppState>,
    Json(req): Json<UserLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid username or password",
            "AUTH_REQUIRED",
        )
    };

    let (subject, is_admin) =
        if req.username == API_KEY_LOGIN_USERNAME && is_api_key_format(&req.password) {
            if !state.api_key_enabled {
                return Err(ApiError::new(
                    StatusCode::FORBIDDEN,
                    "API key authentication is disabled",
                    "APIKEY_DISABLED",
                ));
            }
            let valid = state
                .keys
                .validate_key(&req.password)
                .await
                .map_err(|e| ApiError::from_key_error(e, "APIKEY_UPDATE_FAILED"))?;
            if !valid {
                return Err(invalid());
            }
            (API_KEY_LOGIN_SUBJECT, false)
        } else {
            match state.users.get(&req.username) {
                Some(password) if *password == req.password => (req.username.as_str(), false),
                _ => return Err(invalid()),
            }
        };

    let (token, expires_at) = state.signer.mint(subject, is_admin).map_err(|e| {
        tracing::error!(error = %e, "Token minting failed");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate token",
            "TOKEN_GENERATION_FAILED",
        )
    })?;

    Ok(Json(LoginResponse { token, expires_at }))
}

/// Stateless logout; tokens expire on their own
async fn logout_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Logged out" }))
}

/// Echo the resolved identity
///
/// When authentication is disabled the middleware attaches no identity and
/// the endpoint reports an anonymous pass-through.
async fn verify_handler(
    principal: Option<Extension<AuthenticatedPrincipal>>,
) -> impl IntoResponse {
    match principal {
        Some(Extension(AuthenticatedPrincipal(p))) => Json(serde_json::json!({
            "valid": true,
            "username": p.subject(),
            "is_admin": p.is_admin(),
        })),
        None => Json(serde_json::json!({
            "valid": true,
            "username": null,
            "is_admin": false,
        })),
    }
}

/// Self-service status for the API key the request authenticated with
async fn my_key_handler(
    State(state): State<AppState>,
    presented: Option<Extension<PresentedApiKey>>,
) -> Result<Json<KeyStatusResponse>, ApiError> {
    let Some(Extension(PresentedApiKey(key))) = presented else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "API key required",
            "APIKEY_MISSING",
        ));
    };

    let record = state
        .keys
        .get_key(&key)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_LIST_FAILED"))?;

    let status = if !record.is_enabled {
        "disabled"
    } else if record.is_expired() {
        "expired"
    } else if record.first_used_at.is_none() {
        "dormant"
    } else {
        "active"
    };

    let validity_days = record.ttl_hours / 24;
    let remaining_days = if record.first_used_at.is_none() {
        validity_days
    } else {
        (record.expires_at - Utc::now()).num_days().max(0)
    };

    Ok(Json(KeyStatusResponse {
        key: record.key,
        status,
        created_at: record.created_at,
        first_used_at: record.first_used_at,
        expires_at: record.expires_at,
        validity_days,
        remaining_days,
        description: record.description,
    }))
}

/// List all keys (admin)
async fn list_keys_handler(State(state): State<AppState>) -> impl IntoResponse {
    let keys = state.keys.list_keys().await;
    Json(serde_json::json!({
        "total": keys.len(),
        "api_keys": keys,
    }))
}

/// Create one key (admin)
async fn create_key_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .keys
        .generate_key(req.ttl_hours, &req.description)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_GENERATION_FAILED"))?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Delete one key (admin)
async fn delete_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .keys
        .revoke_key(&key)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_DELETE_FAILED"))?;

    Ok(Json(serde_json::json!({ "message": "API key deleted" })))
}

/// Update one key's expiry (admin)
async fn update_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<UpdateKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .keys
        .update_key_expiry(&key, req.expires_at, req.extend_hours)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_UPDATE_FAILED"))?;

    Ok(Json(record))
}

/// Create a batch of keys (admin)
async fn batch_create_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .keys
        .batch_generate_keys(req.count, req.ttl_hours, &req.description_prefix)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_GENERATION_FAILED"))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "count": records.len(),
            "api_keys": records,
        })),
    ))
}

/// Extend a batch of keys (admin)
async fn batch_extend_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchExtendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .keys
        .batch_extend_keys(&req.keys, req.extend_hours)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_UPDATE_FAILED"))?;

    Ok(Json(result))
}

/// Delete a batch of keys (admin)
async fn batch_delete_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchDeleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .keys
        .batch_delete_keys(&req.keys)
        .await
        .map_err(|e| ApiError::from_key_error(e, "APIKEY_DELETE_FAILED"))?;

    Ok(Json(result))
}
