//! Connection configuration and pool status models.

use crate::error::TabulaError;

use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Rows per INSERT statement during bulk inserts.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

/// Additional connection options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u32,
    /// Application name sent to PostgreSQL
    pub application_name: String,
    /// Maximum number of pooled session connections
    pub pool_max_size: usize,
    /// How long to wait for a pooled connection before giving up
    pub pool_wait_timeout_secs: u32,
    /// Rows per INSERT statement for bulk inserts
    pub insert_batch_size: usize,
    /// Threads in the worker runtime
    pub worker_threads: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            application_name: "tabula".to_string(),
            pool_max_size: 4,
            pool_wait_timeout_secs: 30,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            worker_threads: 2,
        }
    }
}

/// Configuration for a database connection.
///
/// Immutable once built; the handle shares it behind an `Arc`. The password is
/// accepted on deserialization but never serialized or printed by `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Unique identifier, used to correlate log lines
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Server hostname or IP
    pub host: String,
    /// Server port (default 5432)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login password
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Database whose schemas are enumerated (default "postgres")
    #[serde(default = "default_database")]
    pub database: String,
    /// Additional options
    #[serde(default)]
    pub options: ConnectionOptions,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

impl ConnectionConfig {
    /// Create a new connection configuration with required fields.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: default_database(),
            options: ConnectionOptions::default(),
        }
    }

    /// Create a builder for complex configurations.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Read a configuration from `TABULA_PG_*` environment variables.
    ///
    /// `TABULA_PG_HOST` and `TABULA_PG_USER` are required; `TABULA_PG_PORT`,
    /// `TABULA_PG_PASSWORD` and `TABULA_PG_DATABASE` fall back to defaults.
    pub fn from_env() -> Result<Self, TabulaError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TabulaError> {
        let host = lookup("TABULA_PG_HOST")
            .ok_or_else(|| TabulaError::config("TABULA_PG_HOST is not set"))?;
        let username = lookup("TABULA_PG_USER")
            .ok_or_else(|| TabulaError::config("TABULA_PG_USER is not set"))?;
        let port = match lookup("TABULA_PG_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| TabulaError::config(format!("Invalid TABULA_PG_PORT '{raw}': {e}")))?,
            None => DEFAULT_PORT,
        };

        let mut builder = Self::builder()
            .host(host)
            .port(port)
            .username(username)
            .password(lookup("TABULA_PG_PASSWORD").unwrap_or_default());
        if let Some(database) = lookup("TABULA_PG_DATABASE") {
            builder = builder.database(database);
        }
        builder.build()
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TabulaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TabulaError::config(format!("Failed to read '{}': {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate().map_err(TabulaError::config)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host is required".to_string());
        }
        if self.port == 0 {
            return Err("Port must be non-zero".to_string());
        }
        if self.username.is_empty() {
            return Err("Username is required".to_string());
        }
        if self.database.is_empty() || self.database.len() > 63 {
            return Err("Database name must be 1-63 characters".to_string());
        }
        if self.options.insert_batch_size == 0 {
            return Err("Insert batch size must be at least 1".to_string());
        }
        if self.options.pool_max_size == 0 {
            return Err("Pool size must be at least 1".to_string());
        }
        if self.options.worker_threads == 0 {
            return Err("Worker threads must be at least 1".to_string());
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!(
            "postgresql://{}@{}/{}",
            urlencoding::encode(&self.username),
            self.authority(),
            urlencoding::encode(&self.database)
        )
    }

    fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Startup `options` value that pins `search_path` to one schema.
///
/// The schema is double-quoted so mixed case survives, and spaces are
/// backslash-escaped because libpq splits `options` on whitespace.
pub fn search_path_option(schema: &str) -> String {
    let quoted = format!("\"{}\"", schema.replace('"', "\"\""));
    format!("-c search_path={}", quoted.replace(' ', "\\ "))
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for ConnectionConfig.
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    host: Option<String>,
    port: u16,
    username: Option<String>,
    password: String,
    database: Option<String>,
    options: ConnectionOptions,
}

impl ConnectionConfigBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set connection options.
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout_secs(mut self, secs: u32) -> Self {
        self.options.connect_timeout_secs = secs;
        self
    }

    /// Set the bulk insert batch size.
    pub fn insert_batch_size(mut self, rows: usize) -> Self {
        self.options.insert_batch_size = rows;
        self
    }

    /// Set the number of worker threads.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.options.worker_threads = threads;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ConnectionConfig, TabulaError> {
        let config = ConnectionConfig {
            id: Uuid::new_v4(),
            host: self.host.ok_or_else(|| TabulaError::config("Host is required"))?,
            port: if self.port == 0 { DEFAULT_PORT } else { self.port },
            username: self.username.ok_or_else(|| TabulaError::config("Username is required"))?,
            password: self.password,
            database: self.database.unwrap_or_else(default_database),
            options: self.options,
        };
        config.validate().map_err(TabulaError::config)?;
        Ok(config)
    }
}

/// Connection pool status.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Maximum pool capacity
    pub max_size: usize,
    /// Current connections (idle + active)
    pub size: usize,
    /// Idle connections (can be negative during contention)
    pub available: isize,
    /// Tasks waiting for connections
    pub waiting: usize,
}

impl PoolStatus {
    /// Check if the pool is healthy.
    pub fn is_healthy(&self) -> bool {
        self.available >= 0 && self.waiting == 0
    }

    /// Get the number of active (in-use) connections.
    pub fn active(&self) -> usize {
        self.size.saturating_sub(self.available.max(0) as usize)
    }
}
