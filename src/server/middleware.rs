//! HTTP middleware for productivity-api
//!
//! This module provides middleware for:
//! - Bearer token authentication
//! - Request/response logging

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthManager;
use crate::database::Database;
use crate::error::{ApiError, AuthError};
use crate::models::{Claims, Identity};

/// Authenticated admin extension for requests
#[derive(Clone, Debug)]
pub struct AuthenticatedAdmin(pub Claims);

impl AuthenticatedAdmin {
    /// Identity the token was issued to
    pub fn identity(&self) -> Identity {
        self.0.identity()
    }
}

/// Authentication middleware function
///
/// This middleware:
/// 1. Extracts the bearer token from the Authorization header
/// 2. Validates signature, expiry and revocation
/// 3. Adds the authenticated admin to the request extensions
///
/// Every failure renders the same 401 body.
pub async fn auth_middleware<D: Database + 'static>(
    State(auth_manager): State<Arc<AuthManager<D>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(bearer_token)
        .ok_or(AuthError::MissingAuth)?
        .ok_or(AuthError::InvalidToken)?;

    let claims = auth_manager.authenticate(token)?;

    request.extensions_mut().insert(AuthenticatedAdmin(claims));

    Ok(next.run(request).await)
}

/// Extract the token from a `Bearer <token>` header value
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RateLimitConfig, RevocationRegistry, TokenAuthority};
    use crate::database::MockDatabase;
    use axum::{middleware, routing::get, Extension, Router};
    use std::net::SocketAddr;
    use std::time::Duration;

    fn create_test_auth_manager() -> Arc<AuthManager<MockDatabase>> {
        let tokens = TokenAuthority::new(
            b"middleware-test-secret-0123456789ab",
            Duration::from_secs(3600),
            Arc::new(RevocationRegistry::new()),
        );
        Arc::new(AuthManager::new(
            Arc::new(MockDatabase::new()),
            tokens,
            RateLimitConfig::default(),
            1000,
        ))
    }

    async fn whoami(Extension(admin): Extension<AuthenticatedAdmin>) -> String {
        admin.identity().username
    }

    async fn spawn_app(auth_manager: Arc<AuthManager<MockDatabase>>) -> SocketAddr {
        let app = Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(
                auth_manager.clone(),
                auth_middleware::<MockDatabase>,
            ))
            .route("/health", get(|| async { "OK" }))
            .layer(middleware::from_fn(logging_middleware))
            .with_state(auth_manager)
            .into_make_service_with_connect_info::<SocketAddr>();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        addr
    }

    // Test 1: Routes outside the protected group need no token
    #[tokio::test]
    async fn test_unprotected_route_passes() {
        let addr = spawn_app(create_test_auth_manager()).await;

        let response = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    // Test 2: Missing header is rejected with the uniform body
    #[tokio::test]
    async fn test_rejects_missing_header() {
        let addr = spawn_app(create_test_auth_manager()).await;

        let response = reqwest::get(format!("http://{}/whoami", addr))
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "msg": "Unauthorized" }));
    }

    // Test 3: Valid bearer token reaches the handler with the identity attached
    #[tokio::test]
    async fn test_accepts_valid_token() {
        let auth_manager = create_test_auth_manager();
        let issued = auth_manager
            .tokens()
            .issue(&Identity::new("admin"))
            .unwrap();
        let addr = spawn_app(auth_manager).await;

        let response = reqwest::Client::new()
            .get(format!("http://{}/whoami", addr))
            .bearer_auth(&issued.token)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "admin");
    }

    // Test 4: Wrong scheme, garbage and revoked tokens all get 401
    #[tokio::test]
    async fn test_rejects_bad_tokens() {
        let auth_manager = create_test_auth_manager();
        let issued = auth_manager
            .tokens()
            .issue(&Identity::new("admin"))
            .unwrap();
        auth_manager.logout(&issued.claims);
        let addr = spawn_app(auth_manager).await;
        let client = reqwest::Client::new();

        for value in [
            format!("Basic {}", issued.token),
            "Bearer garbage".to_string(),
            "Bearer".to_string(),
            format!("Bearer {}", issued.token),
        ] {
            let response = client
                .get(format!("http://{}/whoami", addr))
                .header("Authorization", value)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 401);
        }
    }

    // Test 5: Bearer parsing
    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
