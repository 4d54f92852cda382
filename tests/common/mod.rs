//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use productivity_api::auth::{AuthManager, RateLimitConfig, RevocationRegistry, TokenAuthority};
use productivity_api::database::{Database, SqliteDatabase};
use productivity_api::server::AppState;

pub const TEST_SECRET: &[u8] = b"integration-test-secret-0123456789";

/// "admin123" hashed with PBKDF2-SHA256 at 29000 rounds
pub const ADMIN_HASH: &str =
    "$pbkdf2-sha256$29000$jxGiWsEHvp1OKjOLEP7iAQ$laRMa7WUqFziKEOABoIJ7loDdrERo/plTj51b6okIhY";

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::in_memory()
            .await
            .expect("Failed to create test database"),
    )
}

/// Create an in-memory database with admin/admin123 seeded
pub async fn create_seeded_database() -> Arc<SqliteDatabase> {
    let database = create_test_database().await;
    database
        .insert_admin("admin", Some(ADMIN_HASH))
        .await
        .expect("Failed to seed admin");
    database
}

/// Create a test authentication manager
pub fn create_test_auth_manager<D: Database>(
    db: Arc<D>,
    rate_limit: RateLimitConfig,
) -> Arc<AuthManager<D>> {
    let tokens = TokenAuthority::new(
        TEST_SECRET,
        Duration::from_secs(3600),
        Arc::new(RevocationRegistry::new()),
    );
    Arc::new(AuthManager::new(db, tokens, rate_limit, 1000))
}

/// Create a test application state
pub fn create_test_state(database: Arc<SqliteDatabase>) -> AppState<SqliteDatabase> {
    create_test_state_with_limit(database, RateLimitConfig::default())
}

/// Create a test application state with a custom login rate limit
pub fn create_test_state_with_limit(
    database: Arc<SqliteDatabase>,
    rate_limit: RateLimitConfig,
) -> AppState<SqliteDatabase> {
    let auth_manager = create_test_auth_manager(Arc::clone(&database), rate_limit);
    AppState {
        auth_manager,
        database,
    }
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState<SqliteDatabase>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = productivity_api::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .into_make_service_with_connect_info::<SocketAddr>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

/// Log in over HTTP and return the bearer token
pub async fn login(client: &reqwest::Client, addr: SocketAddr, password: &str) -> reqwest::Response {
    client
        .post(format!("http://{}/login", addr))
        .json(&serde_json::json!({ "username": "admin", "password": password }))
        .send()
        .await
        .expect("Login request failed")
}

/// Log in as admin/admin123 and return the token
pub async fn admin_token(client: &reqwest::Client, addr: SocketAddr) -> String {
    let response = login(client, addr, "admin123").await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid login body");
    body["token"]
        .as_str()
        .expect("Missing token")
        .to_string()
}
