//! Tabula: a synchronous PostgreSQL table-access layer.
//!
//! This crate lets blocking callers browse schemas and read or rewrite table
//! rows without managing an async runtime:
//!
//! - **handle**: [`DatabaseHandle`], the entry point for every operation
//! - **worker**: runs async database work to completion for a blocking caller
//! - **models**: connection configuration, table metadata, tabular results
//! - **services**: connection pooling, schema reflection, queries, row CRUD
//! - **error**: error handling with PostgreSQL-specific details
//! - **logging**: structured logging setup

pub mod error;
pub mod handle;
pub mod logging;
pub mod models;
pub mod services;
pub mod worker;


pub use error::{ErrorInfo, TabulaError};
pub use handle::DatabaseHandle;
pub use models::{
    ColumnDetail, ConnectionConfig, ConnectionConfigBuilder, ConnectionOptions, PoolStatus,
    TableDescriptor, TableRegistry, TabularResult,
};
pub use services::{ConnectionPool, CrudService, QueryService, QueryType, SchemaService};
pub use worker::Worker;
