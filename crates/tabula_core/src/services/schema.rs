//! Schema reflection service.
//!
//! Queries PostgreSQL system catalogs to discover schemas, the tables of one
//! schema and their columns.

use crate::error::TabulaError;
use crate::models::schema::{ColumnDetail, TableDescriptor};

/// Schema reflection service.
pub struct SchemaService;

impl SchemaService {
    /// Load all schema names, excluding system schemas, in name order.
    pub async fn load_schemas(client: &tokio_postgres::Client) -> Result<Vec<String>, TabulaError> {
        let rows = client
            .query(
                r#"
                SELECT n.nspname AS name
                FROM pg_catalog.pg_namespace n
                WHERE n.nspname NOT LIKE 'pg_%'
                  AND n.nspname != 'information_schema'
                ORDER BY n.nspname
                "#,
                &[],
            )
            .await?;

        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    /// Reflect every ordinary and partitioned table of `schema` with its columns.
    ///
    /// Tables and columns come back from a single catalog query; tables are in
    /// name order and columns in ordinal order.
    pub async fn load_tables(
        client: &tokio_postgres::Client,
        schema: &str,
    ) -> Result<Vec<TableDescriptor>, TabulaError> {
        let rows = client
            .query(
                r#"
                SELECT
                    c.relname AS table_name,
                    a.attname AS name,
                    pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
                    NOT a.attnotnull AS is_nullable,
                    COALESCE(
                        (SELECT TRUE FROM pg_catalog.pg_constraint con
                         WHERE con.conrelid = a.attrelid
                           AND con.contype = 'p'
                           AND a.attnum = ANY(con.conkey)),
                        FALSE
                    ) AS is_primary_key,
                    pg_get_expr(d.adbin, d.adrelid) AS default_value,
                    a.attnum::integer AS ordinal_position
                FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                LEFT JOIN pg_catalog.pg_attribute a
                       ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
                LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                WHERE n.nspname = $1
                  AND c.relkind IN ('r', 'p')
                ORDER BY c.relname, a.attnum
                "#,
                &[&schema],
            )
            .await?;

        let mut tables: Vec<TableDescriptor> = Vec::new();
        for row in rows {
            let table_name: String = row.get("table_name");
            if tables.last().map(|t| t.name != table_name).unwrap_or(true) {
                tables.push(TableDescriptor {
                    schema: schema.to_string(),
                    name: table_name,
                    columns: Vec::new(),
                });
            }

            // Tables without columns still produce one row with NULL column fields.
            let Some(name) = row.get::<_, Option<String>>("name") else {
                continue;
            };
            if let Some(table) = tables.last_mut() {
                table.columns.push(ColumnDetail {
                    name,
                    data_type: row.get("data_type"),
                    is_nullable: row.get("is_nullable"),
                    is_primary_key: row.get("is_primary_key"),
                    default_value: row.get("default_value"),
                    ordinal_position: row.get("ordinal_position"),
                });
            }
        }

        tracing::debug!(schema, table_count = tables.len(), "Schema reflected");

        Ok(tables)
    }

    /// Reflect one table, or `None` if it does not exist in `schema`.
    pub async fn load_table(
        client: &tokio_postgres::Client,
        schema: &str,
        table: &str,
    ) -> Result<Option<TableDescriptor>, TabulaError> {
        let columns = Self::load_columns(client, schema, table).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(TableDescriptor {
            schema: schema.to_string(),
            name: table.to_string(),
            columns,
        }))
    }

    /// Load columns for a specific table.
    pub async fn load_columns(
        client: &tokio_postgres::Client,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDetail>, TabulaError> {
        let rows = client
            .query(
                r#"
                SELECT
                    a.attname AS name,
                    pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
                    NOT a.attnotnull AS is_nullable,
                    COALESCE(
                        (SELECT TRUE FROM pg_catalog.pg_constraint con
                         WHERE con.conrelid = a.attrelid
                           AND con.contype = 'p'
                           AND a.attnum = ANY(con.conkey)),
                        FALSE
                    ) AS is_primary_key,
                    pg_get_expr(d.adbin, d.adrelid) AS default_value,
                    a.attnum::integer AS ordinal_position
                FROM pg_catalog.pg_attribute a
                JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                WHERE n.nspname = $1
                  AND c.relname = $2
                  AND c.relkind IN ('r', 'p')
                  AND a.attnum > 0
                  AND NOT a.attisdropped
                ORDER BY a.attnum
                "#,
                &[&schema, &table],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ColumnDetail {
                name: row.get("name"),
                data_type: row.get("data_type"),
                is_nullable: row.get("is_nullable"),
                is_primary_key: row.get("is_primary_key"),
                default_value: row.get("default_value"),
                ordinal_position: row.get("ordinal_position"),
            })
            .collect())
    }
}
