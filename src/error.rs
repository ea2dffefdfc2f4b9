//! Error types for the connection broker.
//!
//! This module defines the broker's error taxonomy using `thiserror`. Each
//! variant maps onto one class of failure a caller can act on: incomplete
//! input, an id collision, an unreachable engine, an unknown id, or a statement
//! the engine rejected.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Missing parameter: {parameter}")]
    MissingParameter { parameter: String },

    #[error("Unsupported database type: {engine}")]
    UnsupportedEngine { engine: String },

    #[error("Connection '{connection_id}' already exists")]
    DuplicateConnectionId { connection_id: String },

    #[error("Database connection error: {message}")]
    ConnectionFailed { message: String, suggestion: String },

    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    #[error("Query execution failed: {message}")]
    QueryExecution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BrokerError {
    /// Create a missing parameter error.
    pub fn missing_parameter(parameter: impl Into<String>) -> Self {
        Self::MissingParameter {
            parameter: parameter.into(),
        }
    }

    /// Create an unsupported engine error.
    pub fn unsupported_engine(engine: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            engine: engine.into(),
        }
    }

    /// Create a duplicate connection id error.
    pub fn duplicate_connection_id(connection_id: impl Into<String>) -> Self {
        Self::DuplicateConnectionId {
            connection_id: connection_id.into(),
        }
    }

    /// Create a connection failure with a helpful suggestion.
    pub fn connection_failed(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection not found error.
    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    /// Create a query execution error with optional SQL state.
    pub fn query_execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::QueryExecution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a driver error raised while running a statement.
    pub fn from_query_error(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                Self::query_execution(db_err.message(), code)
            }
            other => Self::query_execution(other.to_string(), None),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailed { suggestion, .. } => Some(suggestion),
            Self::DuplicateConnectionId { .. } => {
                Some("Disconnect first or use a different connection ID")
            }
            Self::ConnectionNotFound { .. } => Some("Connect before issuing this operation"),
            _ => None,
        }
    }

    /// Check if this error was caused by the caller's input rather than the broker
    /// or the database engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::UnsupportedEngine { .. }
                | Self::DuplicateConnectionId { .. }
                | Self::ConnectionNotFound { .. }
        )
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
