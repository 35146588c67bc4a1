//! SQL statement construction for table reads and row mutations.
//!
//! Values travel as text parameters and are cast to the reflected column type
//! on the server (`CAST($1::text AS integer)`), so any type with a text input
//! form works without client-side type mapping.

use crate::error::TabulaError;
use crate::models::{ColumnDetail, TableDescriptor, TabularResult};

use serde_json::Value;
use tokio_postgres::types::ToSql;

/// PostgreSQL's limit on bind parameters in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// A bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// A single value in text form (`None` is SQL NULL).
    Text(Option<String>),
    /// An array of values in text form.
    TextArray(Vec<Option<String>>),
}

impl SqlParam {
    /// Borrow as a `tokio_postgres` parameter.
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Text(value) => value,
            Self::TextArray(values) => values,
        }
    }
}

/// A statement plus its bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text with `$n` placeholders.
    pub sql: String,
    /// Parameters, `$1` first.
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// Parameters borrowed for execution.
    pub fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(SqlParam::as_sql).collect()
    }
}

/// Quote an identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Schema-qualified, quoted table name.
pub fn qualified_name(table: &TableDescriptor) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

/// Text form of a cell, as sent to the server.
///
/// Strings go as-is, numbers and booleans in their JSON spelling, arrays and
/// objects as JSON text, and `null` as SQL NULL.
pub fn cell_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn cast_param(index: usize, data_type: &str) -> String {
    format!("CAST(${index}::text AS {data_type})")
}

/// Type to compare through for column types without an `=` operator.
///
/// `json` compares as `jsonb`; geometric types and `xml` compare by their text
/// form. Array types map element-wise (`json[]` to `jsonb[]`).
pub fn comparable_type(data_type: &str) -> Option<String> {
    let element = data_type.trim_end_matches("[]");
    let dims = &data_type[element.len()..];
    let target = match element {
        "json" => "jsonb",
        "xml" | "point" | "line" | "lseg" | "box" | "path" | "polygon" | "circle" => "text",
        _ => return None,
    };
    Some(format!("{target}{dims}"))
}

/// `"column" = <value>` where `value` is a SQL expression of the column's type.
fn equals(column: &ColumnDetail, value: &str) -> String {
    let name = quote_ident(&column.name);
    match comparable_type(&column.data_type) {
        Some(cmp) => format!("CAST({name} AS {cmp}) = CAST({value} AS {cmp})"),
        None => format!("{name} = {value}"),
    }
}

/// Map each payload column onto the table's column of the same name.
pub fn resolve_columns<'t>(
    table: &'t TableDescriptor,
    data: &TabularResult,
) -> Result<Vec<&'t ColumnDetail>, TabulaError> {
    if data.columns().is_empty() {
        return Err(TabulaError::invalid_data("payload has no columns"));
    }
    data.columns()
        .iter()
        .map(|name| {
            table.column(name).ok_or_else(|| TabulaError::unknown_column(&table.name, name))
        })
        .collect()
}

/// `SELECT` of every column in ordinal order.
pub fn select_all(table: &TableDescriptor) -> String {
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
    let projection = if columns.is_empty() { "*".to_string() } else { columns.join(", ") };
    format!("SELECT {projection} FROM {}", qualified_name(table))
}

/// Equality-AND predicate over every column of one row.
///
/// Null cells become `IS NULL`; other cells take the next parameter slot
/// starting at `$first_index`.
fn row_predicate(
    columns: &[&ColumnDetail],
    row: &[Value],
    first_index: usize,
    params: &mut Vec<SqlParam>,
) -> String {
    let mut index = first_index;
    let clauses: Vec<String> = columns
        .iter()
        .zip(row)
        .map(|(column, value)| match cell_to_text(value) {
            None => format!("{} IS NULL", quote_ident(&column.name)),
            Some(text) => {
                params.push(SqlParam::Text(Some(text)));
                let clause = equals(column, &cast_param(index, &column.data_type));
                index += 1;
                clause
            }
        })
        .collect();
    clauses.join(" AND ")
}

/// Delete every row matching all of `row`'s values.
pub fn delete_matching_row(
    table: &TableDescriptor,
    columns: &[&ColumnDetail],
    row: &[Value],
) -> Statement {
    let mut params = Vec::new();
    let predicate = row_predicate(columns, row, 1, &mut params);
    Statement {
        sql: format!("DELETE FROM {} WHERE {predicate}", qualified_name(table)),
        params,
    }
}

/// Delete every row whose `key` value is one of `keys`.
pub fn delete_by_keys(table: &TableDescriptor, key: &ColumnDetail, keys: &[Value]) -> Statement {
    let values = keys.iter().map(cell_to_text).collect();
    let name = quote_ident(&key.name);
    let keys_param = format!("CAST($1::text[] AS {}[])", key.data_type);
    let predicate = match comparable_type(&key.data_type) {
        Some(cmp) => format!("CAST({name} AS {cmp}) = ANY(CAST({keys_param} AS {cmp}[]))"),
        None => format!("{name} = ANY({keys_param})"),
    };
    Statement {
        sql: format!("DELETE FROM {} WHERE {predicate}", qualified_name(table)),
        params: vec![SqlParam::TextArray(values)],
    }
}

/// Set every column to `row`'s value on rows matching all of `row`'s values.
pub fn update_matching_row(
    table: &TableDescriptor,
    columns: &[&ColumnDetail],
    row: &[Value],
) -> Statement {
    let mut params = Vec::new();
    let set_clause = assignments(columns, row, &mut params);
    let predicate = row_predicate(columns, row, params.len() + 1, &mut params);
    Statement {
        sql: format!("UPDATE {} SET {set_clause} WHERE {predicate}", qualified_name(table)),
        params,
    }
}

/// Set every non-key column to `row`'s value on the row whose key matches.
///
/// Returns `None` when the payload has no column besides the key.
pub fn update_by_key(
    table: &TableDescriptor,
    columns: &[&ColumnDetail],
    key_index: usize,
    row: &[Value],
) -> Option<Statement> {
    let (set_columns, set_values): (Vec<&ColumnDetail>, Vec<Value>) = columns
        .iter()
        .zip(row)
        .enumerate()
        .filter(|(i, _)| *i != key_index)
        .map(|(_, (c, v))| (*c, v.clone()))
        .unzip();
    if set_columns.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    let set_clause = assignments(&set_columns, &set_values, &mut params);
    let key_column = [columns[key_index]];
    let key_value = &row[key_index..=key_index];
    let predicate = row_predicate(&key_column, key_value, params.len() + 1, &mut params);
    Some(Statement {
        sql: format!("UPDATE {} SET {set_clause} WHERE {predicate}", qualified_name(table)),
        params,
    })
}

fn assignments(columns: &[&ColumnDetail], row: &[Value], params: &mut Vec<SqlParam>) -> String {
    let first = params.len() + 1;
    columns
        .iter()
        .zip(row)
        .enumerate()
        .map(|(i, (column, value))| {
            params.push(SqlParam::Text(cell_to_text(value)));
            format!("{} = {}", quote_ident(&column.name), cast_param(first + i, &column.data_type))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows per INSERT so that one statement stays within the bind-parameter limit.
pub fn insert_chunk_rows(batch_size: usize, column_count: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / column_count.max(1);
    batch_size.min(by_params).max(1)
}

/// Multi-row INSERT of `rows` into `columns`.
pub fn insert_rows(
    table: &TableDescriptor,
    columns: &[&ColumnDetail],
    rows: &[Vec<Value>],
) -> Statement {
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let mut params = Vec::with_capacity(rows.len() * columns.len());
    let mut tuples = Vec::with_capacity(rows.len());

    for row in rows {
        let placeholders: Vec<String> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                params.push(SqlParam::Text(cell_to_text(value)));
                cast_param(params.len(), &column.data_type)
            })
            .collect();
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES {}",
            qualified_name(table),
            column_list.join(", "),
            tuples.join(", ")
        ),
        params,
    }
}
