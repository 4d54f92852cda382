//! Bounded connection pool for SQLite
//!
//! `ConnectionProvider::acquire` hands out a validated connection wrapped in a
//! [`PooledConnection`] guard. Dropping the guard returns the connection to the
//! idle list and frees its slot, on every exit path. Acquisition is retried
//! with a fixed delay when the pool is exhausted or a connection cannot be
//! opened.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::config::{DatabaseConfig, RetryConfig};
use crate::error::ConnectionError;
use crate::retry::RetryManager;

/// Opens new database connections for the pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a fresh connection
    async fn connect(&self) -> Result<Connection, ConnectionError>;
}

/// Opens SQLite connections to a file path or URI
pub struct SqliteConnector {
    path: String,
    busy_timeout: Duration,
}

impl SqliteConnector {
    /// Connector for the given file path or `file:` URI
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Connector for a private in-memory database
    ///
    /// Every pooled connection opens the same `memdb` database. Unlike a
    /// shared-cache URI it uses ordinary locking, so `busy_timeout` covers
    /// concurrent writers. A plain `:memory:` path would give each
    /// connection its own empty database.
    pub fn in_memory() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let nonce: u32 = rand::random();
        Self::new(format!("file:/productivity-{}-{}?vfs=memdb", id, nonce))
    }

    /// Path or URI this connector opens
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnector {
    async fn connect(&self) -> Result<Connection, ConnectionError> {
        let conn = Connection::open(self.path.clone())
            .await
            .map_err(|e| ConnectionError::Open(e.to_string()))?;

        let busy_timeout = self.busy_timeout;
        conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(|e| ConnectionError::Open(e.to_string()))?;

        Ok(conn)
    }
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl PoolInner {
    fn take_idle(&self) -> Option<Connection> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn put_idle(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

/// Hands out pooled connections with bounded retry
#[derive(Clone)]
pub struct ConnectionProvider {
    inner: Arc<PoolInner>,
    retry: RetryManager,
}

impl ConnectionProvider {
    /// Create a provider with `size` slots and the given retry policy
    pub fn new(factory: Arc<dyn ConnectionFactory>, size: usize, retry: RetryConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                idle: Mutex::new(Vec::with_capacity(size)),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
            retry: RetryManager::new(retry).with_operation("db_acquire"),
        }
    }

    /// Create a provider for `path` using the pool settings from `config`
    pub fn from_config(path: &str, config: &DatabaseConfig) -> Self {
        let factory: Arc<dyn ConnectionFactory> = if path == ":memory:" {
            Arc::new(SqliteConnector::in_memory())
        } else {
            Arc::new(SqliteConnector::new(path))
        };
        Self::new(factory, config.pool_size, config.retry_config())
    }

    /// Acquire a connection, retrying on transient failure
    ///
    /// Makes at most `max_attempts` attempts and then returns the last error.
    pub async fn acquire(&self) -> Result<PooledConnection, ConnectionError> {
        self.retry.execute(|| self.try_acquire()).await
    }

    /// Single acquisition attempt without retry
    pub async fn try_acquire(&self) -> Result<PooledConnection, ConnectionError> {
        let permit = Arc::clone(&self.inner.permits)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => ConnectionError::PoolExhausted,
                TryAcquireError::Closed => ConnectionError::Closed,
            })?;

        let conn = match self.inner.take_idle() {
            Some(conn) if is_alive(&conn).await => conn,
            Some(_) => {
                debug!("Discarding broken idle connection");
                self.inner.factory.connect().await?
            }
            None => self.inner.factory.connect().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Maximum number of concurrently checked-out connections
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Number of open connections waiting for reuse
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop handing out connections and drop idle ones
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

async fn is_alive(conn: &Connection) -> bool {
    conn.call(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
        .await
        .is_ok()
}

/// A checked-out connection; returns to the pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection is only taken in drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.pool.permits.is_closed() {
                self.pool.put_idle(conn);
            }
        }
    }
}
