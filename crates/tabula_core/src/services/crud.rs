//! Row-level reads and writes against reflected tables.
//!
//! Every mutation of one call runs in a single transaction: the first failing
//! statement rolls the whole call back and its error is returned.

use crate::error::TabulaError;
use crate::models::{ColumnDetail, ConnectionConfig, TableDescriptor, TabularResult};
use crate::services::connection::{ConnectionPool, ScopedConnection, Transaction};
use crate::services::query::QueryService;
use crate::services::schema::SchemaService;
use crate::services::sql::{self, Statement};

use serde_json::Value;
use std::time::Instant;

/// Service for table reads and row mutations.
pub struct CrudService;

impl CrudService {
    /// Read every row of `table` using its full column list.
    pub async fn read_all_rows(
        pool: &ConnectionPool,
        table: &TableDescriptor,
    ) -> Result<TabularResult, TabulaError> {
        let conn = pool.get().await?;
        let result = QueryService::fetch_tabular(conn.client(), &sql::select_all(table)).await?;

        tracing::debug!(
            schema = %table.schema,
            table = %table.name,
            row_count = result.row_count(),
            "Table read"
        );
        Ok(result)
    }

    /// Append `data` to `schema.table_name` over a fresh scoped connection.
    ///
    /// The table is reflected on that connection and must already exist.
    /// Rows go in batches of at most `batch_size` rows, all in one transaction.
    /// Returns the number of rows inserted.
    pub async fn bulk_insert(
        config: &ConnectionConfig,
        schema: &str,
        table_name: &str,
        data: &TabularResult,
        batch_size: usize,
    ) -> Result<u64, TabulaError> {
        let start = Instant::now();
        let mut conn = ScopedConnection::open(config, schema).await?;

        let table = SchemaService::load_table(conn.client(), schema, table_name)
            .await?
            .ok_or_else(|| TabulaError::table_not_found(schema, table_name))?;
        let columns = sql::resolve_columns(&table, data)?;
        let chunk_rows = sql::insert_chunk_rows(batch_size, columns.len());

        let statements: Vec<Statement> = data
            .rows()
            .chunks(chunk_rows)
            .map(|rows| sql::insert_rows(&table, &columns, rows))
            .collect();

        let txn = conn.transaction().await?;
        let inserted = execute_all(txn, statements, &table, "insert").await?;

        tracing::info!(
            schema,
            table = table_name,
            inserted,
            chunk_rows,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Bulk insert committed"
        );
        Ok(inserted)
    }

    /// Delete rows described by `data`.
    ///
    /// With a non-empty `key`, one statement removes every row whose key value
    /// appears in `data`'s key column. Without one, each data row removes the
    /// rows equal to it on every supplied column. Returns rows deleted.
    pub async fn delete_rows(
        pool: &ConnectionPool,
        table: &TableDescriptor,
        key: Option<&str>,
        data: &TabularResult,
    ) -> Result<u64, TabulaError> {
        let columns = sql::resolve_columns(table, data)?;

        let statements: Vec<Statement> = match key.filter(|k| !k.is_empty()) {
            Some(key) => {
                let (key_column, key_index) = key_position(table, data, key)?;
                let keys: Vec<Value> = data.rows().iter().map(|row| row[key_index].clone()).collect();
                if keys.is_empty() {
                    Vec::new()
                } else {
                    vec![sql::delete_by_keys(table, key_column, &keys)]
                }
            }
            None => data
                .rows()
                .iter()
                .map(|row| sql::delete_matching_row(table, &columns, row))
                .collect(),
        };

        let mut conn = pool.get().await?;
        let txn = conn.transaction().await?;
        let deleted = execute_all(txn, statements, table, "delete").await?;

        tracing::debug!(schema = %table.schema, table = %table.name, deleted, "Rows deleted");
        Ok(deleted)
    }

    /// Update rows equal to each data row on every supplied column, setting
    /// those columns to the row's values. Returns rows updated.
    pub async fn modify_rows(
        pool: &ConnectionPool,
        table: &TableDescriptor,
        data: &TabularResult,
    ) -> Result<u64, TabulaError> {
        let columns = sql::resolve_columns(table, data)?;
        let statements: Vec<Statement> = data
            .rows()
            .iter()
            .map(|row| sql::update_matching_row(table, &columns, row))
            .collect();

        let mut conn = pool.get().await?;
        let txn = conn.transaction().await?;
        let updated = execute_all(txn, statements, table, "modify").await?;

        tracing::debug!(schema = %table.schema, table = %table.name, updated, "Rows modified");
        Ok(updated)
    }

    /// Update the row whose `key` matches each data row, setting every other
    /// supplied column. Returns rows updated.
    pub async fn modify_rows_by_key(
        pool: &ConnectionPool,
        table: &TableDescriptor,
        key: &str,
        data: &TabularResult,
    ) -> Result<u64, TabulaError> {
        let columns = sql::resolve_columns(table, data)?;
        let (_, key_index) = key_position(table, data, key)?;
        if columns.len() < 2 {
            return Err(TabulaError::invalid_data(format!(
                "payload has no columns to update besides key '{key}'"
            )));
        }

        let statements: Vec<Statement> = data
            .rows()
            .iter()
            .filter_map(|row| sql::update_by_key(table, &columns, key_index, row))
            .collect();

        let mut conn = pool.get().await?;
        let txn = conn.transaction().await?;
        let updated = execute_all(txn, statements, table, "modify_by_key").await?;

        tracing::debug!(schema = %table.schema, table = %table.name, key, updated, "Rows modified by key");
        Ok(updated)
    }
}

/// Locate `key` both in the table and in the payload.
fn key_position<'t>(
    table: &'t TableDescriptor,
    data: &TabularResult,
    key: &str,
) -> Result<(&'t ColumnDetail, usize), TabulaError> {
    let column = table.column(key).ok_or_else(|| TabulaError::unknown_column(&table.name, key))?;
    let index = data
        .column_index(key)
        .ok_or_else(|| TabulaError::invalid_data(format!("key column '{key}' missing from payload")))?;
    Ok((column, index))
}

/// Run `statements` in `txn`, committing only if all succeed.
async fn execute_all<I>(
    txn: Transaction<'_>,
    statements: I,
    table: &TableDescriptor,
    operation: &'static str,
) -> Result<u64, TabulaError>
where
    I: IntoIterator<Item = Statement>,
{
    let mut affected = 0;
    for statement in statements {
        let outcome = txn.execute(&statement).await;
        match outcome {
            Ok(rows) => affected += rows,
            Err(e) => {
                tracing::warn!(
                    schema = %table.schema,
                    table = %table.name,
                    operation,
                    error = %e,
                    "Statement failed, rolling back"
                );
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        }
    }
    txn.commit().await?;
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::fixtures::orders;
    use serde_json::json;
    use std::sync::Arc;

    // Worker::call needs Send + 'static futures; these mirror what the handle builds.
    fn assert_send<F: std::future::Future + Send + 'static>(_: F) {}

    #[test]
    fn test_bulk_insert_future_is_send() {
        let config = ConnectionConfig::new("localhost", 5432, "app", "");
        let data = TabularResult::from_rows(["id"], vec![vec![json!(1)], vec![json!(2)]]).unwrap();
        assert_send(async move {
            CrudService::bulk_insert(&config, "sales", "orders", &data, 1).await
        });
    }

    #[allow(dead_code)]
    fn session_futures_are_send(pool: Arc<ConnectionPool>, data: TabularResult) {
        let table = Arc::new(orders());
        let (p, t) = (pool.clone(), table.clone());
        assert_send(async move { CrudService::read_all_rows(&p, &t).await });
        let (p, t, d) = (pool.clone(), table.clone(), data.clone());
        assert_send(async move { CrudService::delete_rows(&p, &t, Some("id"), &d).await });
        let (p, t, d) = (pool.clone(), table.clone(), data.clone());
        assert_send(async move { CrudService::modify_rows(&p, &t, &d).await });
        assert_send(async move { CrudService::modify_rows_by_key(&pool, &table, "id", &data).await });
    }

    #[test]
    fn test_key_position() {
        let table = orders();
        let data = TabularResult::new(["customer", "id"]);
        let (column, index) = key_position(&table, &data, "id").unwrap();
        assert_eq!(column.name, "id");
        assert_eq!(index, 1);

        let err = key_position(&table, &data, "ghost").unwrap_err();
        assert!(matches!(err, TabulaError::UnknownColumn { .. }));

        let err = key_position(&table, &data, "total").unwrap_err();
        assert_eq!(err.category(), "Data");
    }
}
