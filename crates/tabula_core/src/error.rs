//! Error types for Tabula.
//!
//! Every fallible boundary (connecting, reflecting, querying, mutating and the
//! worker itself) reports through [`TabulaError`] instead of an error string or
//! a silent `None`.

use thiserror::Error;

/// Main error type for Tabula.
#[derive(Debug, Error)]
pub enum TabulaError {
    /// Database connection failed or was lost.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// An operation needed a bound session but `connect` has not succeeded yet.
    #[error("Not connected: call connect() first")]
    NotConnected,

    /// Query execution error with PostgreSQL-specific details.
    #[error("{message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// SQLSTATE code (e.g., "42P01").
        code: Option<String>,
    },

    /// The target table does not exist.
    #[error("Table not found: {table}")]
    TableNotFound {
        /// Schema that was searched.
        schema: String,
        /// Table name.
        table: String,
    },

    /// A payload column does not name a column of the target table.
    #[error("Unknown column '{column}' for table {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Offending column label.
        column: String,
    },

    /// A tabular payload is malformed for the requested operation.
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Human-readable error message.
        message: String,
    },

    /// The worker could not run the operation to completion.
    #[error("Worker error: {message}")]
    Worker {
        /// Human-readable error message.
        message: String,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TabulaError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            hint: Some("Check username and password".to_string()),
        }
    }

    /// Create a new query error with full PostgreSQL details.
    pub fn query(
        message: impl Into<String>,
        detail: Option<String>,
        hint: Option<String>,
        position: Option<usize>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, hint, position, code }
    }

    /// Create a table-not-found error.
    pub fn table_not_found(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self::TableNotFound { schema: schema.into(), table: table.into() }
    }

    /// Create an unknown-column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn { table: table.into(), column: column.into() }
    }

    /// Create an invalid-data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData { message: message.into() }
    }

    /// Create a worker error.
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker { message: message.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Check if this error means the session is missing or gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotConnected)
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } | Self::NotConnected => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Query { .. } => "Query",
            Self::TableNotFound { .. } | Self::UnknownColumn { .. } => "Schema",
            Self::InvalidData { .. } => "Data",
            Self::Worker { .. } => "Worker",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::NotConnected => Some("Connect before selecting a schema"),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::TableNotFound { .. } => Some("Check the schema and table name"),
            Self::UnknownColumn { .. } => Some("Payload columns must match the table's columns"),
            Self::InvalidData { .. } => None,
            Self::Worker { .. } => None,
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get the SQLSTATE code (if applicable).
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get position in query (if applicable).
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Query { position, .. } => *position,
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            Self::TableNotFound { schema, .. } => Some(format!("Schema: {schema}")),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for logs or an expanded view.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to TabulaError.
impl From<tokio_postgres::Error> for TabulaError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code_str = db_err.code().code();

            return match code_str {
                "28P01" => TabulaError::Authentication {
                    message,
                    hint: Some("Invalid password - check your credentials".to_string()),
                },
                _ if code_str.starts_with("28") => TabulaError::Authentication {
                    message,
                    hint: Some("Authentication failed - check username and permissions".to_string()),
                },
                _ if code_str.starts_with("08") => {
                    TabulaError::Connection { message, source: Some(Box::new(err)) }
                }
                _ => TabulaError::Query {
                    message,
                    detail,
                    hint,
                    position,
                    code: Some(code_str.to_string()),
                },
            };
        }

        if err.is_closed() {
            return TabulaError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        TabulaError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to TabulaError.
impl From<serde_json::Error> for TabulaError {
    fn from(err: serde_json::Error) -> Self {
        TabulaError::Config { message: format!("JSON error: {err}") }
    }
}

/// Convert from tokio::task::JoinError to TabulaError.
impl From<tokio::task::JoinError> for TabulaError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            TabulaError::worker(format!("Operation panicked: {err}"))
        } else {
            TabulaError::worker(format!("Operation did not complete: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_info_lists_details() {
        let err = TabulaError::query(
            "relation \"missing\" does not exist",
            Some("extra".to_string()),
            None,
            Some(15),
            Some("42P01".to_string()),
        );

        let info = err.to_error_info();
        assert_eq!(info.error_type, "Query Error");
        assert_eq!(info.message, "relation \"missing\" does not exist");
        let detail = info.technical_detail.unwrap();
        assert!(detail.contains("Code: 42P01"));
        assert!(detail.contains("Position: 15"));
        assert!(detail.contains("Detail: extra"));
        assert_eq!(err.sqlstate(), Some("42P01"));
        assert_eq!(err.position(), Some(15));
    }

    #[test]
    fn test_categories_and_hints() {
        assert_eq!(TabulaError::NotConnected.category(), "Connection");
        assert!(TabulaError::NotConnected.is_connection_lost());
        assert!(TabulaError::NotConnected.hint().is_some());

        let err = TabulaError::unknown_column("users", "nope");
        assert_eq!(err.category(), "Schema");
        assert_eq!(err.to_string(), "Unknown column 'nope' for table users");

        let err = TabulaError::table_not_found("public", "ghosts");
        assert_eq!(err.to_string(), "Table not found: ghosts");
        assert_eq!(err.to_error_info().technical_detail.as_deref(), Some("Schema: public"));

        assert_eq!(TabulaError::worker("boom").category(), "Worker");
        assert!(TabulaError::invalid_data("x").hint().is_none());
    }

    #[test]
    fn test_authentication_has_default_hint() {
        let err = TabulaError::authentication("password authentication failed");
        assert_eq!(err.hint(), Some("Check username and password"));
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_json_error_becomes_config_error() {
        let err: TabulaError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.category(), "Config");
        assert!(err.to_string().starts_with("Config error: JSON error"));
    }
}
