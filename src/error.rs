//! Application error types for productivity-api
//!
//! Domain errors use `thiserror`. `ApiError` is the single place where any
//! internal failure is turned into an HTTP status and a `{"msg": ...}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Authentication-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Token is missing a valid signature, expired, revoked or malformed
    #[error("Invalid token")]
    InvalidToken,

    /// Username or password did not match
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Too many login attempts from one address
    #[error("Rate limited: too many login attempts")]
    RateLimited,

    /// Missing authorization header
    #[error("Missing authorization header")]
    MissingAuth,

    /// Token could not be signed
    #[error("Failed to issue token: {0}")]
    TokenIssue(String),
}

/// Errors raised while acquiring a pooled database connection
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectionError {
    /// Every connection in the pool is checked out
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Opening a new connection failed
    #[error("Failed to open connection: {0}")]
    Open(String),

    /// The pool has been shut down
    #[error("Connection pool closed")]
    Closed,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// No connection could be acquired
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record not found
    #[error("Record not found")]
    NotFound,

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Failure in the async connection wrapper itself
    #[error("Connection worker error: {0}")]
    Worker(tokio_rusqlite::Error),
}

impl From<tokio_rusqlite::Error> for DbError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => DbError::Sqlite(e),
            tokio_rusqlite::Error::ConnectionClosed => {
                DbError::Connection(ConnectionError::Closed)
            }
            other => DbError::Worker(other),
        }
    }
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for ConnectionError {
    fn is_retryable(&self) -> bool {
        match self {
            ConnectionError::PoolExhausted => true,
            ConnectionError::Open(_) => true,
            ConnectionError::Closed => false,
        }
    }
}

/// Error returned by HTTP handlers and middleware
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request fields (400)
    #[error("Invalid input: {0}")]
    Input(String),

    /// Bad credentials or unusable token (401, 429 when rate limited)
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Connection retries exhausted (500)
    #[error("Database unavailable: {0}")]
    Connection(ConnectionError),

    /// Target record does not exist (404)
    #[error("Not found: {0}")]
    Integrity(String),

    /// Anything else (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(e) => ApiError::Connection(e),
            DbError::NotFound => ApiError::Integrity("Record not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Auth(AuthError::TokenIssue(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Connection(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Integrity(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client
    ///
    /// Token failures all collapse into one message so callers cannot tell
    /// expired, revoked and forged tokens apart.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Input(msg) => msg.clone(),
            ApiError::Auth(AuthError::InvalidCredentials) => {
                "Invalid username or password".to_string()
            }
            ApiError::Auth(AuthError::RateLimited) => {
                "Too many login attempts. Please try again later.".to_string()
            }
            ApiError::Auth(AuthError::TokenIssue(_)) => "Internal server error".to_string(),
            ApiError::Auth(_) => "Unauthorized".to_string(),
            ApiError::Connection(_) => "Database error".to_string(),
            ApiError::Integrity(msg) => msg.clone(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = serde_json::json!({ "msg": self.public_message() });
        (status, Json(body)).into_response()
    }
}
