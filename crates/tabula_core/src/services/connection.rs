//! Database connections.
//!
//! Two kinds of connection are used:
//! - [`ConnectionPool`]: the handle's long-lived session, pooled with
//!   deadpool-postgres and validated on creation
//! - [`ScopedConnection`]: a one-off connection whose `search_path` is pinned to
//!   a schema, used by raw queries and bulk inserts so they never share
//!   transactional state with the session

use crate::error::TabulaError;
use crate::models::connection::search_path_option;
use crate::models::{ConnectionConfig, PoolStatus};
use crate::services::sql::Statement;

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;
use uuid::Uuid;

fn pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
    let connect_timeout = Duration::from_secs(config.options.connect_timeout_secs as u64);

    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.username);
    pg_config.password(&config.password);
    pg_config.application_name(&config.options.application_name);
    pg_config.connect_timeout(connect_timeout);
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(60));
    pg_config
}

/// The session: a managed pool of connections for one ConnectionConfig.
pub struct ConnectionPool {
    /// Matches ConnectionConfig.id
    id: Uuid,
    /// The actual connection pool
    pool: Pool,
    /// When this pool was created
    created_at: DateTime<Utc>,
}

impl ConnectionPool {
    /// Create a new connection pool and validate it with a test query.
    pub async fn new(config: Arc<ConnectionConfig>) -> Result<Self, TabulaError> {
        let connect_timeout = Duration::from_secs(config.options.connect_timeout_secs as u64);
        let wait_timeout = Duration::from_secs(config.options.pool_wait_timeout_secs as u64);

        let manager = Manager::from_config(
            pg_config(&config),
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );

        let pool = Pool::builder(manager)
            .max_size(config.options.pool_max_size)
            .wait_timeout(Some(wait_timeout))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| TabulaError::connection(format!("Failed to create pool: {e}")))?;

        let client = pool.get().await.map_err(pool_error)?;
        client.execute("SELECT 1", &[]).await.map_err(|e| match TabulaError::from(e) {
            TabulaError::Connection { message, source } => TabulaError::Connection {
                message: format!("Connection validation failed: {message}"),
                source,
            },
            other => other,
        })?;

        tracing::info!(
            connection_id = %config.id,
            url = %config.display_url(),
            "Connection pool created"
        );

        Ok(Self { id: config.id, pool, created_at: Utc::now() })
    }

    /// Acquire a connection from the pool.
    pub async fn get(&self) -> Result<PooledConnection, TabulaError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        Ok(PooledConnection { client })
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available as isize,
            waiting: status.waiting,
        }
    }

    /// Close the pool, dropping all connections.
    pub fn close(&self) {
        self.pool.close();
        let open_secs = (Utc::now() - self.created_at).num_seconds();
        tracing::info!(
            connection_id = %self.id,
            created_at = %self.created_at.to_rfc3339(),
            open_secs,
            "Connection pool closed"
        );
    }
}

/// Map a pool checkout failure, keeping the server's own error when there is one.
fn pool_error(err: deadpool_postgres::PoolError) -> TabulaError {
    match err {
        deadpool_postgres::PoolError::Backend(e) => TabulaError::from(e),
        deadpool_postgres::PoolError::Timeout(kind) => {
            TabulaError::connection(format!("Timed out acquiring a connection ({kind:?})"))
        }
        other => TabulaError::connection(format!("Failed to acquire connection: {other}")),
    }
}

/// A connection acquired from the pool.
///
/// Automatically returns to the pool when dropped.
pub struct PooledConnection {
    client: deadpool_postgres::Client,
}

impl PooledConnection {
    /// Borrow the underlying client.
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    /// Begin a transaction.
    pub async fn transaction(&mut self) -> Result<Transaction<'_>, TabulaError> {
        let client: &mut tokio_postgres::Client = &mut self.client;
        let txn = client.transaction().await?;
        Ok(Transaction { txn })
    }
}

/// A connection outside the pool with `search_path` set to one schema.
///
/// The connection closes when this value is dropped.
pub struct ScopedConnection {
    client: tokio_postgres::Client,
}

impl ScopedConnection {
    /// Open a fresh connection scoped to `schema`.
    pub async fn open(config: &ConnectionConfig, schema: &str) -> Result<Self, TabulaError> {
        let mut pg_config = pg_config(config);
        pg_config.options(&search_path_option(schema));

        let (client, connection) = pg_config.connect(NoTls).await?;

        let connection_id = config.id;
        let schema_name = schema.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(
                    connection_id = %connection_id,
                    schema = %schema_name,
                    error = %e,
                    "Scoped connection terminated with error"
                );
            }
        });

        tracing::debug!(connection_id = %config.id, schema, "Scoped connection opened");

        Ok(Self { client })
    }

    /// Borrow the underlying client.
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    /// Begin a transaction.
    pub async fn transaction(&mut self) -> Result<Transaction<'_>, TabulaError> {
        let txn = self.client.transaction().await?;
        Ok(Transaction { txn })
    }
}

/// A database transaction.
///
/// Automatically rolls back on drop unless committed.
pub struct Transaction<'a> {
    txn: tokio_postgres::Transaction<'a>,
}

impl Transaction<'_> {
    /// Execute a built statement within the transaction.
    pub async fn execute(&self, statement: &Statement) -> Result<u64, TabulaError> {
        self.txn
            .execute(statement.sql.as_str(), &statement.param_refs())
            .await
            .map_err(TabulaError::from)
    }

    /// Commit the transaction.
    pub async fn commit(self) -> Result<(), TabulaError> {
        self.txn.commit().await.map_err(TabulaError::from)
    }

    /// Rollback the transaction explicitly.
    pub async fn rollback(self) -> Result<(), TabulaError> {
        self.txn.rollback().await.map_err(TabulaError::from)
    }
}
