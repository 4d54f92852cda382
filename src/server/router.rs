//! HTTP router for productivity-api
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Login, logout and first-admin setup
//! - Employee productivity records (bearer token required)

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        ConnectInfo, Path, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use super::middleware::{auth_middleware, logging_middleware, AuthenticatedAdmin};
use crate::auth::AuthManager;
use crate::database::Database;
use crate::error::ApiError;
use crate::models::{
    AddEmployeeRequest, EmployeeUpdate, LoginRequest, LoginResponse, SetupAdminRequest,
};

const MISSING_CREDENTIALS: &str = "Missing username or password";

/// Shared application state
pub struct AppState<D: Database> {
    /// Authentication manager
    pub auth_manager: Arc<AuthManager<D>>,

    /// Database
    pub database: Arc<D>,
}

impl<D: Database> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            auth_manager: Arc::clone(&self.auth_manager),
            database: Arc::clone(&self.database),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the main application router
///
/// Routes under the protected group require `Authorization: Bearer <token>`.
pub fn build_router<D: Database + 'static>(state: AppState<D>) -> Router {
    let protected = Router::new()
        .route("/logout", post(logout_handler::<D>))
        .route("/employees", get(list_employees_handler::<D>))
        .route("/add", post(add_employee_handler::<D>))
        .route(
            "/employee/:id",
            put(update_employee_handler::<D>).delete(delete_employee_handler::<D>),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.auth_manager),
            auth_middleware::<D>,
        ));

    Router::new()
        // Health endpoints (no auth required)
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        // Session endpoints (no auth required)
        .route("/login", post(login_handler::<D>))
        .route("/setup-admin", post(setup_admin_handler::<D>))
        .merge(protected)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

// =============================================================================
// Health Handlers
// =============================================================================

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Session Handlers
// =============================================================================

/// Exchange username and password for a session token
async fn login_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::Input(MISSING_CREDENTIALS.to_string()))?;
    let (username, password) = required_pair(req.username, req.password)?;
    let client_ip = connect_info.map(|ConnectInfo(addr)| addr.ip());

    let response = state
        .auth_manager
        .login(&username, &password, client_ip)
        .await?;

    Ok(Json(response))
}

/// Revoke the presented token
async fn logout_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    Extension(AuthenticatedAdmin(claims)): Extension<AuthenticatedAdmin>,
) -> impl IntoResponse {
    state.auth_manager.logout(&claims);
    Json(serde_json::json!({ "msg": "Successfully logged out" }))
}

/// Create the first admin account
async fn setup_admin_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    body: Result<Json<SetupAdminRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::Input(MISSING_CREDENTIALS.to_string()))?;
    let (username, password) = required_pair(req.username, req.password)?;

    state.auth_manager.setup_admin(&username, &password).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "msg": "Admin created" })),
    ))
}

fn required_pair(
    username: Option<String>,
    password: Option<String>,
) -> Result<(String, String), ApiError> {
    match (username, password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Ok((u, p)),
        _ => Err(ApiError::Input(MISSING_CREDENTIALS.to_string())),
    }
}

// =============================================================================
// Employee Handlers
// =============================================================================

/// List all productivity records
async fn list_employees_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
) -> Result<impl IntoResponse, ApiError> {
    let employees = state.database.list_employees().await?;
    Ok(Json(serde_json::json!({ "employees": employees })))
}

/// Add a productivity record
async fn add_employee_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    Extension(AuthenticatedAdmin(claims)): Extension<AuthenticatedAdmin>,
    body: Result<Json<AddEmployeeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::Input(e.body_text()))?;
    let employee = req.validate().map_err(ApiError::Input)?;

    let id = state.database.insert_employee(&employee).await?;
    tracing::info!(employee_id = id, by = %claims.sub, "Employee added");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "msg": "Employee added", "id": id })),
    ))
}

/// Update a productivity record
async fn update_employee_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    Extension(AuthenticatedAdmin(claims)): Extension<AuthenticatedAdmin>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<EmployeeUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::Input("Invalid employee id".to_string()))?;
    let Json(update) = body.map_err(|e| ApiError::Input(e.body_text()))?;
    if update.is_empty() {
        return Err(ApiError::Input("No fields to update".to_string()));
    }

    state.database.update_employee(id, &update).await?;
    tracing::info!(employee_id = id, by = %claims.sub, "Employee updated");

    Ok(Json(serde_json::json!({ "msg": "Employee updated" })))
}

/// Delete a productivity record
async fn delete_employee_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    Extension(AuthenticatedAdmin(claims)): Extension<AuthenticatedAdmin>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::Input("Invalid employee id".to_string()))?;

    state.database.delete_employee(id).await?;
    tracing::info!(employee_id = id, by = %claims.sub, "Employee deleted");

    Ok(Json(serde_json::json!({ "msg": "Employee deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, RateLimitConfig, RevocationRegistry, TokenAuthority};
    use crate::database::MockDatabase;
    use crate::error::{ConnectionError, DbError};
    use crate::models::{AdminCredential, Employee, NewEmployee};
    use axum::http::{header, HeaderValue};
    use axum_test::TestServer;
    use std::time::Duration;

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
    }

    fn create_test_state(mock_db: MockDatabase) -> AppState<MockDatabase> {
        let db = Arc::new(mock_db);
        let tokens = TokenAuthority::new(
            b"router-test-secret-0123456789abcdef",
            Duration::from_secs(3600),
            Arc::new(RevocationRegistry::new()),
        );
        let auth_manager = Arc::new(AuthManager::new(
            Arc::clone(&db),
            tokens,
            RateLimitConfig::default(),
            1000,
        ));

        AppState {
            auth_manager,
            database: db,
        }
    }

    fn mock_with_admin() -> MockDatabase {
        let hash = hash_password("admin123", 1000).unwrap();
        let mut mock_db = MockDatabase::new();
        mock_db.expect_find_admin().returning(move |username| {
            Ok((username == "admin")
                .then(|| AdminCredential::new(1, "admin", Some(hash.clone()))))
        });
        mock_db
    }

    async fn login(server: &TestServer) -> String {
        let response = server
            .post("/login")
            .json(&serde_json::json!({ "username": "admin", "password": "admin123" }))
            .await;
        response.assert_status_ok();
        response.json::<LoginResponse>().token
    }

    // Test 1: Health endpoints return OK
    #[tokio::test]
    async fn test_health_endpoints_return_ok() {
        let server = TestServer::new(build_router(create_test_state(MockDatabase::new()))).unwrap();

        for path in ["/", "/health"] {
            let response = server.get(path).await;
            response.assert_status_ok();

            let body: HealthResponse = response.json();
            assert_eq!(body.status, "running");
            assert!(!body.version.is_empty());
        }
    }

    // Test 2: Login returns a token
    #[tokio::test]
    async fn test_login_returns_token() {
        let server = TestServer::new(build_router(create_test_state(mock_with_admin()))).unwrap();

        let response = server
            .post("/login")
            .json(&serde_json::json!({ "username": "admin", "password": "admin123" }))
            .await;

        response.assert_status_ok();
        let body: LoginResponse = response.json();
        assert_eq!(body.username, "admin");
        assert_eq!(body.token.split('.').count(), 3);
    }

    // Test 3: Wrong password is a 401 with a fixed message
    #[tokio::test]
    async fn test_login_wrong_password() {
        let server = TestServer::new(build_router(create_test_state(mock_with_admin()))).unwrap();

        let response = server
            .post("/login")
            .json(&serde_json::json!({ "username": "admin", "password": "wrongpass" }))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&serde_json::json!({ "msg": "Invalid username or password" }));
    }

    // Test 4: Missing fields and bad JSON are 400s
    #[tokio::test]
    async fn test_login_missing_fields() {
        let server = TestServer::new(build_router(create_test_state(MockDatabase::new()))).unwrap();

        let response = server
            .post("/login")
            .json(&serde_json::json!({ "username": "admin" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({ "msg": "Missing username or password" }));

        let response = server
            .post("/login")
            .json(&serde_json::json!({ "username": "  ", "password": "x" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = server.post("/login").text("not json").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    // Test 5: Database outage during login is a 500
    #[tokio::test]
    async fn test_login_database_error() {
        let mut mock_db = MockDatabase::new();
        mock_db
            .expect_find_admin()
            .returning(|_| Err(DbError::Connection(ConnectionError::PoolExhausted)));
        let server = TestServer::new(build_router(create_test_state(mock_db))).unwrap();

        let response = server
            .post("/login")
            .json(&serde_json::json!({ "username": "admin", "password": "admin123" }))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({ "msg": "Database error" }));
    }

    // Test 6: Protected routes reject missing and bad tokens uniformly
    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let server = TestServer::new(build_router(create_test_state(MockDatabase::new()))).unwrap();

        let response = server.get("/employees").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&serde_json::json!({ "msg": "Unauthorized" }));

        let response = server
            .get("/employees")
            .add_header(header::AUTHORIZATION, bearer("not-a-token"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&serde_json::json!({ "msg": "Unauthorized" }));

        let response = server.post("/logout").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    // Test 7: Logout revokes the token
    #[tokio::test]
    async fn test_logout_then_replay() {
        let mut mock_db = mock_with_admin();
        mock_db.expect_list_employees().returning(|| Ok(vec![]));
        let server = TestServer::new(build_router(create_test_state(mock_db))).unwrap();
        let token = login(&server).await;

        server
            .get("/employees")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status_ok();

        let response = server
            .post("/logout")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({ "msg": "Successfully logged out" }));

        server
            .get("/employees")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    // Test 8: Employees are listed under an "employees" key
    #[tokio::test]
    async fn test_list_employees() {
        let mut mock_db = mock_with_admin();
        mock_db.expect_list_employees().returning(|| {
            Ok(vec![Employee {
                id: 1,
                name: "Ada".to_string(),
                role: "Engineer".to_string(),
                productivity: 90,
                feedback: String::new(),
                rating: Some(5),
                created_at: None,
                updated_at: None,
            }])
        });
        let server = TestServer::new(build_router(create_test_state(mock_db))).unwrap();
        let token = login(&server).await;

        let response = server
            .get("/employees")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["employees"][0]["name"], "Ada");
        assert_eq!(body["employees"][0]["rating"], 5);
    }

    // Test 9: Add employee validates and inserts
    #[tokio::test]
    async fn test_add_employee() {
        let mut mock_db = mock_with_admin();
        mock_db
            .expect_insert_employee()
            .withf(|e: &NewEmployee| e.name == "Ada" && e.productivity == 0)
            .returning(|_| Ok(3));
        let server = TestServer::new(build_router(create_test_state(mock_db))).unwrap();
        let token = login(&server).await;

        let response = server
            .post("/add")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&serde_json::json!({ "name": "Ada", "role": "Engineer" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.assert_json(&serde_json::json!({ "msg": "Employee added", "id": 3 }));

        let response = server
            .post("/add")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&serde_json::json!({ "name": "Ada" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    // Test 10: Update and delete of a missing record are 404s
    #[tokio::test]
    async fn test_missing_employee_is_404() {
        let mut mock_db = mock_with_admin();
        mock_db
            .expect_update_employee()
            .returning(|_, _| Err(DbError::NotFound));
        mock_db
            .expect_delete_employee()
            .returning(|_| Err(DbError::NotFound));
        let server = TestServer::new(build_router(create_test_state(mock_db))).unwrap();
        let token = login(&server).await;

        server
            .put("/employee/42")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&serde_json::json!({ "rating": 3 }))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        server
            .delete("/employee/42")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        server
            .delete("/employee/abc")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    // Test 11: Setup admin is refused once an admin exists
    #[tokio::test]
    async fn test_setup_admin() {
        let mut mock_db = MockDatabase::new();
        let mut created = false;
        mock_db.expect_create_first_admin().returning(move |_, _| {
            let result = if created { None } else { Some(1) };
            created = true;
            Ok(result)
        });
        let server = TestServer::new(build_router(create_test_state(mock_db))).unwrap();
        let body = serde_json::json!({ "username": "admin", "password": "admin123" });

        let response = server.post("/setup-admin").json(&body).await;
        response.assert_status(StatusCode::CREATED);
        response.assert_json(&serde_json::json!({ "msg": "Admin created" }));

        let response = server.post("/setup-admin").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({ "msg": "Admin already exists" }));
    }
}
