use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::types::SqlParam;

#[derive(Debug, Error)]
pub enum DataApiError {
    /// The endpoint could not be reached. The only retryable class.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    /// The engine rejected a statement. Carries the failing SQL and parameters.
    #[error("Statement error: {cause} (sql: {sql})")]
    StatementError {
        sql: String,
        params: Vec<SqlParam>,
        cause: String,
    },

    /// Protocol misuse, e.g. commit on an unknown or already-terminated handle.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Local guard: the session is no longer active.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Migration I/O error at {}: {source}", path.display())]
    MigrationIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?}; outcome unknown, reset required")]
    Timeout(Duration),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),
}

impl DataApiError {
    /// Build a `StatementError` from the failing statement and its cause.
    pub fn statement(sql: &str, params: &[SqlParam], cause: impl ToString) -> Self {
        DataApiError::StatementError {
            sql: sql.to_string(),
            params: params.to_vec(),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn migration_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataApiError::MigrationIo {
            path: path.into(),
            source,
        }
    }

    /// Whether a caller may reasonably retry the same call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataApiError::ConnectionError(_))
    }

    /// Short machine-readable name of the error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DataApiError::ConnectionError(_) => "ConnectionError",
            DataApiError::AuthError(_) => "AuthError",
            DataApiError::StatementError { .. } => "StatementError",
            DataApiError::TransactionError(_) => "TransactionError",
            DataApiError::SessionClosed(_) => "SessionClosedError",
            DataApiError::ConfigError(_) => "ConfigError",
            DataApiError::MigrationIo { .. } => "MigrationIoError",
            DataApiError::Timeout(_) => "TimeoutError",
            DataApiError::ParameterError(_) => "ParameterError",
        }
    }

    /// Structured payload suitable for an invocation response body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let (sql, params) = match self {
            DataApiError::StatementError { sql, params, .. } => {
                (Some(sql.clone()), Some(params.clone()))
            }
            _ => (None, None),
        };
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            sql,
            params,
        }
    }
}

/// Serialized form of a [`DataApiError`] at the invocation boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<SqlParam>>,
}

impl From<serde_json::Error> for DataApiError {
    fn from(err: serde_json::Error) -> Self {
        DataApiError::ParameterError(format!("json serialization failed: {err}"))
    }
}
