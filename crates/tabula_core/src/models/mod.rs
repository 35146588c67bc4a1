//! Data models for Tabula.
//!
//! - `connection` - ConnectionConfig, ConnectionOptions, PoolStatus
//! - `schema` - ColumnDetail, TableDescriptor, TableRegistry
//! - `tabular` - TabularResult

pub mod connection;
pub mod schema;
pub mod tabular;

pub use connection::{ConnectionConfig, ConnectionConfigBuilder, ConnectionOptions, PoolStatus};
pub use schema::{ColumnDetail, TableDescriptor, TableRegistry};
pub use tabular::TabularResult;
