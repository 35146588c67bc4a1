//! Backend services for Tabula.
//!
//! - `connection` - Session pool (deadpool-postgres) and schema-scoped connections
//! - `schema` - Catalog reflection of schemas, tables and columns
//! - `query` - Raw query execution and value decoding
//! - `crud` - Table reads, bulk inserts, deletes and updates
//! - `sql` - Statement construction

pub mod connection;
pub mod crud;
pub mod query;
pub mod schema;
pub mod sql;

pub use connection::{ConnectionPool, PooledConnection, ScopedConnection, Transaction};
pub use crud::CrudService;
pub use query::{QueryService, QueryType};
pub use schema::SchemaService;
