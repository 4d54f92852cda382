//! Database layer for productivity-api
//!
//! This module defines the database trait, the connection pool and the SQLite
//! implementation.

pub mod migrations;
pub mod pool;
pub mod sqlite;

pub use pool::{ConnectionFactory, ConnectionProvider, PooledConnection, SqliteConnector};
pub use sqlite::SqliteDatabase;

use async_trait::async_trait;

use crate::error::DbError;
use crate::models::{AdminCredential, Employee, EmployeeUpdate, NewEmployee};

/// Database trait for data persistence
///
/// This trait defines all database operations needed by the application.
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Database: Send + Sync {
    // =========================================================================
    // Admin operations
    // =========================================================================

    /// Look up an admin by exact username
    async fn find_admin(&self, username: &str) -> Result<Option<AdminCredential>, DbError>;

    /// Create the first admin account
    ///
    /// Returns the new row ID, or `None` if any admin already exists. The
    /// existence check and insert are one statement.
    async fn create_first_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<i64>, DbError>;

    // =========================================================================
    // Productivity record operations
    // =========================================================================

    /// List all records ordered by ID
    async fn list_employees(&self) -> Result<Vec<Employee>, DbError>;

    /// Insert a record
    ///
    /// Returns the ID of the inserted record
    async fn insert_employee(&self, employee: &NewEmployee) -> Result<i64, DbError>;

    /// Apply a partial update; `DbError::NotFound` if the ID does not exist
    async fn update_employee(&self, id: i64, update: &EmployeeUpdate) -> Result<(), DbError>;

    /// Delete a record; `DbError::NotFound` if the ID does not exist
    async fn delete_employee(&self, id: i64) -> Result<(), DbError>;
}
