//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use keygate::auth::{hash_password, AdminGate, RateLimitConfig, RateLimiter, TokenSigner};
use keygate::keys::ApiKeyService;
use keygate::server::{build_router, AppState};

/// Admin password used across the integration tests
pub const ADMIN_PASSWORD: &str = "integration_admin_password";

/// Shared JWT secret used across the integration tests
pub const JWT_SECRET: &str = "integration_test_secret";

/// Build an AppState over the given store path
///
/// Auth and API keys enabled, admin password configured, one user (alice).
pub async fn create_state_at<P: AsRef<Path>>(store_path: P) -> AppState {
    let keys = Arc::new(
        ApiKeyService::new(store_path)
            .await
            .expect("Failed to create key service"),
    );
    let signer = Arc::new(TokenSigner::new(JWT_SECRET, 24));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        max_attempts: 5,
        window: Duration::from_secs(60),
    }));
    let gate = Arc::new(AdminGate::new(
        Some(hash_password(ADMIN_PASSWORD).expect("Failed to hash password")),
        Arc::clone(&signer),
        rate_limiter,
    ));

    let mut users = HashMap::new();
    users.insert("alice".to_string(), "wonderland".to_string());

    AppState {
        keys,
        gate,
        signer,
        users: Arc::new(users),
        auth_enabled: true,
        api_key_enabled: true,
    }
}

/// Build an AppState over a fresh temp store
pub async fn create_test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let state = create_state_at(dir.path().join("apikeys.json")).await;
    (state, dir)
}

/// Run a test server in the background and return its address
///
/// The server shuts down when the returned sender is dropped or used.
pub async fn run_test_server(state: AppState) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = build_router(state);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");
    });

    // Give the server a moment to start (100ms is sufficient for slow CI systems)
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

/// Log in as admin over HTTP and return the bearer token
pub async fn admin_token(client: &reqwest::Client, addr: SocketAddr) -> String {
    let response = client
        .post(format!("http://{}/api/admin/login", addr))
        .json(&serde_json::json!({ "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    body["token"]
        .as_str()
        .expect("login response missing token")
        .to_string()
}
