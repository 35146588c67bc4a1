//! Reflected schema models.
//!
//! Tables discovered by reflection are held in a [`TableRegistry`] that covers
//! exactly one schema at a time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A PostgreSQL column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDetail {
    /// Column name.
    pub name: String,
    /// Data type as printed by `format_type` (e.g., "integer", "character varying(255)").
    pub data_type: String,
    /// Whether the column allows NULL values.
    pub is_nullable: bool,
    /// Whether this column is part of the primary key.
    pub is_primary_key: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
    /// Column position (1-based ordinal).
    pub ordinal_position: i32,
}

/// Reflected metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema containing the table.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnDetail>,
}

impl TableDescriptor {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDetail> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key columns in ordinal order.
    pub fn primary_key(&self) -> Vec<&ColumnDetail> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }
}

/// Mapping from table name to reflected table metadata for one schema.
///
/// Only [`TableRegistry::replace`] and [`TableRegistry::clear`] mutate it, and
/// both discard whatever was loaded before.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    schema: Option<String>,
    order: Vec<String>,
    tables: HashMap<String, Arc<TableDescriptor>>,
}

impl TableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registry contents with `tables` from `schema`.
    pub fn replace(&mut self, schema: impl Into<String>, tables: Vec<TableDescriptor>) {
        self.clear();
        self.schema = Some(schema.into());
        for table in tables {
            if !self.tables.contains_key(&table.name) {
                self.order.push(table.name.clone());
            }
            self.tables.insert(table.name.clone(), Arc::new(table));
        }
    }

    /// Remove every table.
    pub fn clear(&mut self) {
        self.schema = None;
        self.order.clear();
        self.tables.clear();
    }

    /// Schema the registry currently holds, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Look up a table by name.
    pub fn get(&self, name: &str) -> Option<Arc<TableDescriptor>> {
        self.tables.get(name).cloned()
    }

    /// Check whether a table is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in reflection order.
    pub fn table_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if no tables are registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn column(name: &str, data_type: &str, ordinal: i32) -> ColumnDetail {
        ColumnDetail {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            is_primary_key: false,
            default_value: None,
            ordinal_position: ordinal,
        }
    }

    /// `sales.orders (id integer primary key, customer text, total numeric(10,2))`
    pub fn orders() -> TableDescriptor {
        let mut id = column("id", "integer", 1);
        id.is_primary_key = true;
        id.is_nullable = false;
        TableDescriptor {
            schema: "sales".to_string(),
            name: "orders".to_string(),
            columns: vec![id, column("customer", "text", 2), column("total", "numeric(10,2)", 3)],
        }
    }

    pub fn table(schema: &str, name: &str) -> TableDescriptor {
        TableDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: vec![column("id", "integer", 1)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_descriptor_lookups() {
        let orders = orders();
        assert_eq!(orders.column("customer").unwrap().data_type, "text");
        assert!(orders.column("nope").is_none());
        assert_eq!(orders.column_names(), vec!["id", "customer", "total"]);
        let pk: Vec<&str> = orders.primary_key().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(pk, vec!["id"]);
    }

    #[test]
    fn test_replace_discards_previous_schema() {
        let mut registry = TableRegistry::new();
        registry.replace("alpha", vec![table("alpha", "a1"), table("alpha", "a2")]);
        assert_eq!(registry.schema(), Some("alpha"));
        assert_eq!(registry.table_names(), vec!["a1", "a2"]);

        registry.replace("beta", vec![table("beta", "b1")]);
        assert_eq!(registry.schema(), Some("beta"));
        assert_eq!(registry.table_names(), vec!["b1"]);
        assert!(!registry.contains("a1"));
        assert!(registry.get("a2").is_none());
        assert_eq!(registry.get("b1").unwrap().schema, "beta");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut registry = TableRegistry::new();
        registry.replace("alpha", vec![table("alpha", "a1")]);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.schema().is_none());
        assert!(registry.table_names().is_empty());
    }

    #[test]
    fn test_replace_with_empty_schema_keeps_schema_name() {
        let mut registry = TableRegistry::new();
        registry.replace("alpha", vec![table("alpha", "a1")]);
        registry.replace("empty", Vec::new());
        assert_eq!(registry.schema(), Some("empty"));
        assert!(registry.is_empty());
    }
}
