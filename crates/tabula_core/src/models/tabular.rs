//! In-memory tabular data: ordered named columns and ordered rows.

use crate::error::TabulaError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ordered sequence of rows with named, ordered columns.
///
/// Returned by every read operation and accepted as the payload of every write
/// operation. Each row always has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TabularResult {
    /// Create an empty result with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Create a result from columns and rows, checking every row's width.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self, TabulaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = Self::new(columns);
        result.rows.reserve(rows.len());
        for row in rows {
            result.push_row(row)?;
        }
        Ok(result)
    }

    /// Build a result from JSON objects.
    ///
    /// Columns are taken from the first record's keys in order; later records
    /// missing a key get `null` for it, and keys absent from the first record
    /// are rejected.
    pub fn from_records(records: &[Map<String, Value>]) -> Result<Self, TabulaError> {
        let Some(first) = records.first() else {
            return Ok(Self::default());
        };
        let mut result = Self::new(first.keys().cloned());
        for (index, record) in records.iter().enumerate() {
            if let Some(extra) = record.keys().find(|k| !result.columns.contains(k)) {
                return Err(TabulaError::invalid_data(format!(
                    "record {index} has column '{extra}' not present in the first record"
                )));
            }
            let row = result
                .columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            result.rows.push(row);
        }
        Ok(result)
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TabulaError> {
        if row.len() != self.columns.len() {
            return Err(TabulaError::invalid_data(format!(
                "row has {} values but there are {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Get a single row.
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// Get one cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> TabularResult {
        TabularResult::from_rows(
            ["id", "name"],
            vec![vec![json!(1), json!("ada")], vec![json!(2), json!("grace")]],
        )
        .unwrap()
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut result = TabularResult::new(["a", "b"]);
        assert!(result.push_row(vec![json!(1), json!(2)]).is_ok());

        let err = result.push_row(vec![json!(1)]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid data: row has 1 values but there are 2 columns");
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn test_lookup_helpers() {
        let result = people();
        assert_eq!(result.columns(), ["id", "name"]);
        assert_eq!(result.column_count(), 2);
        assert_eq!(result.column_index("name"), Some(1));
        assert_eq!(result.column_index("missing"), None);
        assert_eq!(result.get(1, "name"), Some(&json!("grace")));
        assert_eq!(result.column_values("id").unwrap(), vec![&json!(1), &json!(2)]);
        assert_eq!(result.row(0).unwrap(), &[json!(1), json!("ada")]);
        assert!(result.row(5).is_none());
    }

    #[test]
    fn test_records() {
        let records = people().to_records();
        assert_eq!(records[0]["name"], json!("ada"));
        assert_eq!(records[1]["id"], json!(2));

        let rebuilt = TabularResult::from_records(&records).unwrap();
        assert_eq!(rebuilt, people());
    }

    #[test]
    fn test_from_records_fills_missing_and_rejects_extra() {
        let first = json!({"id": 1, "name": "ada"}).as_object().cloned().unwrap();
        let partial = json!({"id": 2}).as_object().cloned().unwrap();
        let result = TabularResult::from_records(&[first.clone(), partial]).unwrap();
        assert_eq!(result.get(1, "name"), Some(&Value::Null));

        let extra = json!({"id": 3, "age": 40}).as_object().cloned().unwrap();
        let err = TabularResult::from_records(&[first, extra]).unwrap_err();
        assert!(err.to_string().contains("'age'"));

        assert!(TabularResult::from_records(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_serde_shape() {
        let value = serde_json::to_value(people()).unwrap();
        assert_eq!(value["columns"], json!(["id", "name"]));
        assert_eq!(value["rows"][1], json!([2, "grace"]));
    }
}
