//! Connection handle: the synchronous entry point to Tabula.
//!
//! A [`DatabaseHandle`] owns the connection configuration, a [`Worker`], the
//! session pool once connected, and the [`TableRegistry`] for the selected
//! schema. Every database operation runs on the worker; the calling thread
//! blocks until it completes.
//!
//! ```no_run
//! use tabula_core::{ConnectionConfig, DatabaseHandle};
//!
//! # fn main() -> Result<(), tabula_core::TabulaError> {
//! let handle = DatabaseHandle::new(ConnectionConfig::new("localhost", 5432, "app", "secret"))?;
//! let schemas = handle.connect()?;
//! let tables = handle.select_schema(&schemas[0])?;
//! if let Some(rows) = handle.read_all_rows(&tables[0])? {
//!     println!("{} rows", rows.row_count());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::TabulaError;
use crate::models::{ConnectionConfig, PoolStatus, TableDescriptor, TableRegistry, TabularResult};
use crate::services::{ConnectionPool, CrudService, QueryService, SchemaService};
use crate::worker::Worker;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to one database server.
///
/// State is shared behind locks so the handle can be used from several
/// threads, but operations are not coordinated with each other: a
/// `select_schema` racing a `delete_rows` may see either registry.
pub struct DatabaseHandle {
    config: Arc<ConnectionConfig>,
    worker: Worker,
    session: RwLock<Option<Arc<ConnectionPool>>>,
    registry: Arc<RwLock<TableRegistry>>,
    last_columns: Arc<RwLock<Vec<String>>>,
    save_completed: Arc<AtomicBool>,
}

impl DatabaseHandle {
    /// Create an unbound handle. No connection is made until [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Result<Self, TabulaError> {
        config.validate().map_err(TabulaError::config)?;
        let worker = Worker::new(config.options.worker_threads)?;

        tracing::debug!(connection_id = %config.id, url = %config.display_url(), "Handle created");

        Ok(Self {
            config: Arc::new(config),
            worker,
            session: RwLock::new(None),
            registry: Arc::new(RwLock::new(TableRegistry::new())),
            last_columns: Arc::new(RwLock::new(Vec::new())),
            save_completed: Arc::new(AtomicBool::new(false)),
        })
    }

    // ========== Connection ==========

    /// Open the session and return the server's schema names.
    ///
    /// Replaces any previous session and clears the table registry.
    pub fn connect(&self) -> Result<Vec<String>, TabulaError> {
        let config = self.config.clone();
        let outcome = self.worker.call(async move {
            let pool = ConnectionPool::new(config).await?;
            let conn = pool.get().await?;
            let schemas = SchemaService::load_schemas(conn.client()).await?;
            drop(conn);
            Ok((pool, schemas))
        });

        let (pool, schemas) = match outcome {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.config.id,
                    url = %self.config.display_url(),
                    error = %e,
                    "Connect failed"
                );
                return Err(e);
            }
        };

        if let Some(previous) = self.session.write().replace(Arc::new(pool)) {
            previous.close();
        }
        self.registry.write().clear();

        tracing::info!(
            connection_id = %self.config.id,
            schema_count = schemas.len(),
            "Connected"
        );
        Ok(schemas)
    }

    /// Close the session and forget the loaded tables.
    pub fn disconnect(&self) {
        if let Some(pool) = self.session.write().take() {
            pool.close();
        }
        self.registry.write().clear();
    }

    /// Check whether a session is bound.
    pub fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    /// Status of the session pool, if connected.
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.session.read().as_ref().map(|pool| pool.status())
    }

    fn session(&self) -> Result<Arc<ConnectionPool>, TabulaError> {
        self.session.read().clone().ok_or(TabulaError::NotConnected)
    }

    // ========== Table Registry ==========

    /// Load the tables of `schema` into the registry and return their names.
    ///
    /// Tables of the previously selected schema are discarded.
    pub fn select_schema(&self, schema: &str) -> Result<Vec<String>, TabulaError> {
        let pool = self.session()?;
        let schema_name = schema.to_string();
        let tables = self.worker.call(async move {
            let conn = pool.get().await?;
            SchemaService::load_tables(conn.client(), &schema_name).await
        })?;

        let mut registry = self.registry.write();
        registry.replace(schema, tables);
        Ok(registry.table_names())
    }

    /// Schema currently loaded into the registry.
    pub fn current_schema(&self) -> Option<String> {
        self.registry.read().schema().map(String::from)
    }

    /// Names of the registered tables.
    pub fn table_names(&self) -> Vec<String> {
        self.registry.read().table_names()
    }

    /// Reflected metadata of a registered table.
    pub fn table(&self, name: &str) -> Option<Arc<TableDescriptor>> {
        self.registry.read().get(name)
    }

    fn registered(&self, table_name: &str, operation: &str) -> Option<Arc<TableDescriptor>> {
        let table = self.table(table_name);
        if table.is_none() {
            tracing::warn!(
                table = table_name,
                schema = ?self.current_schema(),
                operation,
                "Table is not in the registry; nothing done"
            );
        }
        table
    }

    // ========== CRUD ==========

    /// Read every row of a registered table.
    ///
    /// Returns `Ok(None)` when `table_name` is empty or not registered.
    pub fn read_all_rows(&self, table_name: &str) -> Result<Option<TabularResult>, TabulaError> {
        if table_name.is_empty() {
            return Ok(None);
        }
        let Some(table) = self.registered(table_name, "read_all_rows") else {
            return Ok(None);
        };
        let pool = self.session()?;

        let result = self
            .worker
            .call(async move { CrudService::read_all_rows(&pool, &table).await })?;
        *self.last_columns.write() = result.columns().to_vec();
        Ok(Some(result))
    }

    /// Run literal SQL on a fresh connection scoped to `schema`.
    ///
    /// Does not need (or use) the session.
    pub fn run_raw_query(&self, schema: &str, sql: &str) -> Result<TabularResult, TabulaError> {
        let config = self.config.clone();
        let schema = schema.to_string();
        let sql = sql.to_string();

        let result = self
            .worker
            .call(async move { QueryService::run_raw_query(&config, &schema, &sql).await })?;
        *self.last_columns.write() = result.columns().to_vec();
        Ok(result)
    }

    /// Append `data` to `schema.table_name` in batches and return rows inserted.
    ///
    /// Clears [`save_completed`](Self::save_completed) first and sets it only
    /// after the insert commits.
    pub fn bulk_insert(
        &self,
        schema: &str,
        table_name: &str,
        data: &TabularResult,
    ) -> Result<u64, TabulaError> {
        self.save_completed.store(false, Ordering::SeqCst);

        let config = self.config.clone();
        let schema = schema.to_string();
        let table_name = table_name.to_string();
        let data = data.clone();
        let batch_size = self.config.options.insert_batch_size;
        let save_completed = self.save_completed.clone();

        self.worker.call(async move {
            let inserted =
                CrudService::bulk_insert(&config, &schema, &table_name, &data, batch_size).await?;
            save_completed.store(true, Ordering::SeqCst);
            Ok(inserted)
        })
    }

    /// Delete rows of a registered table and return rows deleted.
    ///
    /// A non-empty `key` deletes by membership of the key column's values;
    /// otherwise each data row deletes the rows equal to it. Returns `Ok(None)`
    /// when the table is not registered.
    pub fn delete_rows(
        &self,
        table_name: &str,
        key: Option<&str>,
        data: &TabularResult,
    ) -> Result<Option<u64>, TabulaError> {
        let Some(table) = self.registered(table_name, "delete_rows") else {
            return Ok(None);
        };
        let pool = self.session()?;
        let key = key.map(String::from);
        let data = data.clone();

        self.worker
            .call(async move {
                CrudService::delete_rows(&pool, &table, key.as_deref(), &data).await
            })
            .map(Some)
    }

    /// Update rows of a registered table matching each data row exactly.
    ///
    /// Returns `Ok(None)` when the table is not registered.
    pub fn modify_rows(
        &self,
        table_name: &str,
        data: &TabularResult,
    ) -> Result<Option<u64>, TabulaError> {
        let Some(table) = self.registered(table_name, "modify_rows") else {
            return Ok(None);
        };
        let pool = self.session()?;
        let data = data.clone();

        self.worker
            .call(async move { CrudService::modify_rows(&pool, &table, &data).await })
            .map(Some)
    }

    /// Update rows of a registered table by key column.
    ///
    /// Returns `Ok(None)` when the table is not registered.
    pub fn modify_rows_by_key(
        &self,
        table_name: &str,
        key: &str,
        data: &TabularResult,
    ) -> Result<Option<u64>, TabulaError> {
        let Some(table) = self.registered(table_name, "modify_rows_by_key") else {
            return Ok(None);
        };
        let pool = self.session()?;
        let key = key.to_string();
        let data = data.clone();

        self.worker
            .call(async move { CrudService::modify_rows_by_key(&pool, &table, &key, &data).await })
            .map(Some)
    }

    // ========== Accessors ==========

    /// Column labels of the most recent read or raw query.
    pub fn last_columns(&self) -> Vec<String> {
        self.last_columns.read().clone()
    }

    /// Whether the most recent bulk insert committed.
    pub fn save_completed(&self) -> bool {
        self.save_completed.load(Ordering::SeqCst)
    }

    /// The handle's configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The worker that runs this handle's operations.
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    #[cfg(test)]
    pub(crate) fn registry_for_test(&self) -> &RwLock<TableRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("schema", &self.current_schema())
            .field("tables", &self.registry.read().len())
            .finish_non_exhaustive()
    }
}

impl Drop for DatabaseHandle {
    fn drop(&mut self) {
        if let Some(pool) = self.session.get_mut().take() {
            pool.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::fixtures::{orders, table};
    use serde_json::json;

    fn handle() -> DatabaseHandle {
        DatabaseHandle::new(ConnectionConfig::new("127.0.0.1", 1, "nobody", "")).unwrap()
    }

    #[test]
    fn test_new_handle_is_unbound() {
        let handle = handle();
        assert!(!handle.is_connected());
        assert!(handle.pool_status().is_none());
        assert!(handle.table_names().is_empty());
        assert!(handle.current_schema().is_none());
        assert!(!handle.save_completed());
        assert!(handle.last_columns().is_empty());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = DatabaseHandle::new(ConnectionConfig::new("", 5432, "app", "")).unwrap_err();
        assert_eq!(err.category(), "Config");
    }

    #[test]
    fn test_debug_shows_state_without_password() {
        let handle = DatabaseHandle::new(ConnectionConfig::new("db.local", 5432, "app", "hunter2"))
            .unwrap();
        handle.registry_for_test().write().replace("sales", vec![orders()]);

        let printed = format!("{handle:?}");
        assert!(printed.contains("connected: false"));
        assert!(printed.contains("schema: Some(\"sales\")"));
        assert!(printed.contains("tables: 1"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_select_schema_requires_connection() {
        let err = handle().select_schema("public").unwrap_err();
        assert!(matches!(err, TabulaError::NotConnected));
    }

    #[test]
    fn test_read_all_rows_without_table_is_a_no_op() {
        let handle = handle();
        assert_eq!(handle.read_all_rows("").unwrap(), None);
        assert_eq!(handle.read_all_rows("ghost").unwrap(), None);
    }

    #[test]
    fn test_mutations_on_unregistered_tables_are_no_ops() {
        let handle = handle();
        let data = TabularResult::from_rows(["id"], vec![vec![json!(1)]]).unwrap();
        assert_eq!(handle.delete_rows("ghost", Some("id"), &data).unwrap(), None);
        assert_eq!(handle.delete_rows("ghost", None, &data).unwrap(), None);
        assert_eq!(handle.modify_rows("ghost", &data).unwrap(), None);
        assert_eq!(handle.modify_rows_by_key("ghost", "id", &data).unwrap(), None);
    }

    #[test]
    fn test_registered_table_without_session_reports_not_connected() {
        let handle = handle();
        handle.registry_for_test().write().replace("sales", vec![orders()]);

        assert_eq!(handle.table_names(), vec!["orders"]);
        assert_eq!(handle.current_schema().as_deref(), Some("sales"));
        assert!(matches!(handle.read_all_rows("orders"), Err(TabulaError::NotConnected)));
        let data = TabularResult::from_rows(["id"], vec![vec![json!(1)]]).unwrap();
        assert!(matches!(handle.modify_rows("orders", &data), Err(TabulaError::NotConnected)));
    }

    #[test]
    fn test_disconnect_clears_registry() {
        let handle = handle();
        handle.registry_for_test().write().replace("alpha", vec![table("alpha", "a1")]);
        handle.disconnect();
        assert!(handle.table_names().is_empty());
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_connect_failure_is_an_error_not_a_value() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(1)
            .username("nobody")
            .connect_timeout_secs(1)
            .build()
            .unwrap();
        let handle = DatabaseHandle::new(config).unwrap();

        let err = handle.connect().unwrap_err();
        assert_eq!(err.category(), "Connection");
        assert!(!err.to_string().is_empty());
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_bulk_insert_failure_leaves_save_flag_clear() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1")
            .port(1)
            .username("nobody")
            .connect_timeout_secs(1)
            .build()
            .unwrap();
        let handle = DatabaseHandle::new(config).unwrap();
        let data = TabularResult::from_rows(["id"], vec![vec![json!(1)]]).unwrap();

        assert!(handle.bulk_insert("public", "t", &data).is_err());
        assert!(!handle.save_completed());
    }
}
