//! SQLite implementation of the Database trait
//!
//! Every operation checks a connection out of the [`ConnectionProvider`] and
//! runs its statements through tokio-rusqlite. The guard goes back to the pool
//! when the operation returns, whether it succeeded or not.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::info;

use super::migrations::CREATE_SCHEMA;
use super::pool::ConnectionProvider;
use super::Database;
use crate::config::DatabaseConfig;
use crate::error::{ConnectionError, DbError};
use crate::models::{AdminCredential, Employee, EmployeeUpdate, NewEmployee};

/// SQLite database implementation
pub struct SqliteDatabase {
    pool: ConnectionProvider,
}

impl SqliteDatabase {
    /// Open the database at `config.path` and run migrations
    ///
    /// Use `:memory:` for an in-memory database shared by all pooled
    /// connections (see [`super::pool::SqliteConnector::in_memory`]).
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DbError> {
        if config.path != ":memory:" && !config.path.starts_with("file:") {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DbError::Connection(ConnectionError::Open(format!(
                            "Cannot create database directory {}: {}",
                            parent.display(),
                            e
                        )))
                    })?;
                }
            }
        }

        let pool = ConnectionProvider::from_config(&config.path, config);
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and run migrations
    pub async fn with_pool(pool: ConnectionProvider) -> Result<Self, DbError> {
        let conn = pool.acquire().await?;
        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;
        drop(conn);

        info!(pool_size = pool.size(), "Database ready");
        Ok(Self { pool })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(&DatabaseConfig {
            path: ":memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &ConnectionProvider {
        &self.pool
    }

    /// Insert an admin row directly, bypassing the first-admin check
    ///
    /// Used to seed credentials in any hash format.
    pub async fn insert_admin(
        &self,
        username: &str,
        password_hash: Option<&str>,
    ) -> Result<i64, DbError> {
        let username = username.to_string();
        let password_hash = password_hash.map(str::to_string);

        let conn = self.pool.acquire().await?;
        conn.call(move |conn| {
            conn.execute(
                "INSERT INTO admins (username, password_hash) VALUES (?1, ?2)",
                rusqlite::params![username, password_hash],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_constraint)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    // =========================================================================
    // Admin operations
    // =========================================================================

    async fn find_admin(&self, username: &str) -> Result<Option<AdminCredential>, DbError> {
        let username = username.to_string();

        let conn = self.pool.acquire().await?;
        conn.call(move |conn| {
            let result = conn
                .query_row(
                    r#"
                    SELECT id, username, password_hash, created_at
                    FROM admins
                    WHERE username = ?1
                    "#,
                    [&username],
                    |row| {
                        Ok(AdminCredential {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password_hash: row.get(2)?,
                            created_at: parse_datetime(row.get::<_, Option<String>>(3)?),
                        })
                    },
                )
                .optional()?;

            Ok(result)
        })
        .await
        .map_err(Into::into)
    }

    async fn create_first_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<i64>, DbError> {
        let username = username.to_string();
        let password_hash = password_hash.to_string();

        let conn = self.pool.acquire().await?;
        conn.call(move |conn| {
            let inserted = conn.execute(
                r#"
                INSERT INTO admins (username, password_hash)
                SELECT ?1, ?2
                WHERE NOT EXISTS (SELECT 1 FROM admins)
                "#,
                rusqlite::params![username, password_hash],
            )?;

            if inserted == 0 {
                Ok(None)
            } else {
                Ok(Some(conn.last_insert_rowid()))
            }
        })
        .await
        .map_err(map_constraint)
    }

    // =========================================================================
    // Productivity record operations
    // =========================================================================

    async fn list_employees(&self) -> Result<Vec<Employee>, DbError> {
        let conn = self.pool.acquire().await?;
        conn.call(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, name, role, productivity, feedback, rating, created_at, updated_at
                FROM productivity
                ORDER BY id
                "#,
            )?;

            let employees = stmt
                .query_map([], |row| {
                    Ok(Employee {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        role: row.get(2)?,
                        productivity: row.get(3)?,
                        feedback: row.get(4)?,
                        rating: row.get(5)?,
                        created_at: parse_datetime(row.get::<_, Option<String>>(6)?),
                        updated_at: parse_datetime(row.get::<_, Option<String>>(7)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(employees)
        })
        .await
        .map_err(Into::into)
    }

    async fn insert_employee(&self, employee: &NewEmployee) -> Result<i64, DbError> {
        let employee = employee.clone();

        let conn = self.pool.acquire().await?;
        conn.call(move |conn| {
            conn.execute(
                r#"
                INSERT INTO productivity (name, role, productivity, feedback, rating)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                rusqlite::params![
                    employee.name,
                    employee.role,
                    employee.productivity,
                    employee.feedback,
                    employee.rating
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(Into::into)
    }

    async fn update_employee(&self, id: i64, update: &EmployeeUpdate) -> Result<(), DbError> {
        let update = update.clone();

        let conn = self.pool.acquire().await?;
        let rows_affected = conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    UPDATE productivity
                    SET name = COALESCE(?1, name),
                        role = COALESCE(?2, role),
                        productivity = COALESCE(?3, productivity),
                        feedback = COALESCE(?4, feedback),
                        rating = COALESCE(?5, rating),
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?6
                    "#,
                    rusqlite::params![
                        update.name,
                        update.role,
                        update.productivity,
                        update.feedback,
                        update.rating,
                        id
                    ],
                )
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn delete_employee(&self, id: i64) -> Result<(), DbError> {
        let conn = self.pool.acquire().await?;
        let rows_affected = conn
            .call(move |conn| conn.execute("DELETE FROM productivity WHERE id = ?1", [id]))
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}

/// Map UNIQUE violations to `ConstraintViolation`
fn map_constraint(err: tokio_rusqlite::Error) -> DbError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, msg))
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::ConstraintViolation(msg.unwrap_or_else(|| code.to_string()))
        }
        other => DbError::from(other),
    }
}

/// Parse a datetime string to DateTime<Utc>
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // Try parsing SQLite's datetime format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
