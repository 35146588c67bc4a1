//! Query execution into [`TabularResult`]s.
//!
//! Statements are described first (which yields column labels and types even
//! when no rows come back), then executed over the simple-query protocol so
//! every value arrives in its text form and no type is left undecodable.

use crate::error::TabulaError;
use crate::models::{ConnectionConfig, TabularResult};
use crate::services::connection::ScopedConnection;

use serde_json::Value;
use std::time::Instant;
use tokio_postgres::types::Type;
use tokio_postgres::SimpleQueryMessage;

/// Type of SQL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// SELECT query returning rows
    Select,
    /// INSERT operation
    Insert,
    /// UPDATE operation
    Update,
    /// DELETE operation
    Delete,
    /// DDL, COPY, or other operations
    Other,
}

/// Service for executing queries.
pub struct QueryService;

impl QueryService {
    /// Execute literal SQL on a fresh connection scoped to `schema`.
    ///
    /// The connection is independent of the handle's session and is closed
    /// when the query finishes.
    pub async fn run_raw_query(
        config: &ConnectionConfig,
        schema: &str,
        sql: &str,
    ) -> Result<TabularResult, TabulaError> {
        let start = Instant::now();
        let query_type = Self::detect_query_type(sql);

        tracing::debug!(schema, query_type = ?query_type, "Executing raw query");

        let conn = ScopedConnection::open(config, schema).await?;
        let result = Self::fetch_tabular(conn.client(), sql).await;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(table) => tracing::debug!(
                schema,
                execution_time_ms,
                row_count = table.row_count(),
                "Raw query completed"
            ),
            Err(e) => tracing::warn!(
                schema,
                execution_time_ms,
                error = %e,
                "Raw query failed"
            ),
        }
        result
    }

    /// Describe and execute `sql`, collecting every row.
    pub async fn fetch_tabular(
        client: &tokio_postgres::Client,
        sql: &str,
    ) -> Result<TabularResult, TabulaError> {
        let statement = client.prepare(sql).await?;
        let columns = statement.columns();
        let types: Vec<Type> = columns.iter().map(|c| c.type_().clone()).collect();
        let mut result = TabularResult::new(columns.iter().map(|c| c.name().to_string()));

        for message in client.simple_query(sql).await? {
            if let SimpleQueryMessage::Row(row) = message {
                let values = (0..row.len())
                    .map(|i| decode_text(types.get(i).unwrap_or(&Type::TEXT), row.get(i)))
                    .collect();
                result.push_row(values)?;
            }
        }

        Ok(result)
    }

    /// Detect the type of SQL query.
    pub fn detect_query_type(sql: &str) -> QueryType {
        let trimmed = sql.trim_start().to_uppercase();

        if trimmed.starts_with("SELECT") || trimmed.starts_with("WITH") {
            QueryType::Select
        } else if trimmed.starts_with("INSERT") {
            QueryType::Insert
        } else if trimmed.starts_with("UPDATE") {
            QueryType::Update
        } else if trimmed.starts_with("DELETE") {
            QueryType::Delete
        } else {
            QueryType::Other
        }
    }
}

/// Convert a value in PostgreSQL text format to JSON according to its type.
///
/// Booleans, integers, floats and JSON become native JSON values; every other
/// type (numeric, dates, arrays, ...) stays a string so no precision is lost.
pub fn decode_text(ty: &Type, raw: Option<&str>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    match *ty {
        Type::BOOL => match raw {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Type::FLOAT4 | Type::FLOAT8 => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Type::JSON | Type::JSONB => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_type_detection() {
        assert_eq!(QueryService::detect_query_type("SELECT * FROM users"), QueryType::Select);
        assert_eq!(QueryService::detect_query_type("  select 1"), QueryType::Select);
        assert_eq!(
            QueryService::detect_query_type("WITH cte AS (SELECT 1) SELECT * FROM cte"),
            QueryType::Select
        );
        assert_eq!(QueryService::detect_query_type("INSERT INTO t VALUES (1)"), QueryType::Insert);
        assert_eq!(QueryService::detect_query_type("UPDATE t SET x = 1"), QueryType::Update);
        assert_eq!(QueryService::detect_query_type("delete from t"), QueryType::Delete);
        assert_eq!(QueryService::detect_query_type("CREATE TABLE t (id INT)"), QueryType::Other);
    }

    #[test]
    fn test_decode_null() {
        assert_eq!(decode_text(&Type::INT4, None), Value::Null);
        assert_eq!(decode_text(&Type::TEXT, None), Value::Null);
    }

    #[test]
    fn test_decode_booleans() {
        assert_eq!(decode_text(&Type::BOOL, Some("t")), json!(true));
        assert_eq!(decode_text(&Type::BOOL, Some("f")), json!(false));
    }

    #[test]
    fn test_decode_numbers() {
        assert_eq!(decode_text(&Type::INT4, Some("42")), json!(42));
        assert_eq!(decode_text(&Type::INT8, Some("-9000000000")), json!(-9_000_000_000i64));
        assert_eq!(decode_text(&Type::FLOAT8, Some("2.5")), json!(2.5));
        assert_eq!(decode_text(&Type::FLOAT8, Some("NaN")), json!("NaN"));
        assert_eq!(decode_text(&Type::FLOAT4, Some("Infinity")), json!("Infinity"));
    }

    #[test]
    fn test_decode_keeps_numeric_and_dates_as_text() {
        assert_eq!(
            decode_text(&Type::NUMERIC, Some("12345678901234567890.01")),
            json!("12345678901234567890.01")
        );
        assert_eq!(decode_text(&Type::DATE, Some("2024-02-29")), json!("2024-02-29"));
        assert_eq!(decode_text(&Type::VARCHAR, Some("hello")), json!("hello"));
    }

    #[test]
    fn test_decode_json() {
        assert_eq!(decode_text(&Type::JSONB, Some(r#"{"a": [1, 2]}"#)), json!({"a": [1, 2]}));
        assert_eq!(decode_text(&Type::JSON, Some("not json")), json!("not json"));
    }
}
