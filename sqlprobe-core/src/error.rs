//! Error types shared across the sqlprobe crates.
//!
//! Two tiers of faults flow through this module: expected absences (missing
//! configuration keys, empty metadata result sets) are handled at the
//! boundary nearest their source and never become an error value, while
//! structural faults (connection failures, cursor acquisition failures,
//! driver-level statement errors, I/O) are represented here, logged once with
//! their category, and propagated unchanged to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sqlprobe operations.
#[derive(Debug, Error)]
pub enum SqlProbeError {
    /// Database connection failed
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Cursor acquisition failed on an open connection
    #[error("Cursor acquisition failed: {context}")]
    Cursor {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Statement execution or row fetch failed
    #[error("Query execution failed: {context}")]
    Query {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An explicitly supplied script path does not exist
    #[error("Script path not found: {path}")]
    ScriptNotFound { path: PathBuf },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with SqlProbeError
pub type Result<T> = std::result::Result<T, SqlProbeError>;

impl SqlProbeError {
    /// Creates a connection error with context
    pub fn connection<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a cursor acquisition error with context
    pub fn cursor<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Cursor {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a query execution error with context
    pub fn query<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Query {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a script-not-found error
    pub fn script_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ScriptNotFound { path: path.into() }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: error,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, error: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source: error,
        }
    }

    /// Short category name of this fault, used when logging `{category}: {message}` lines.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Cursor { .. } => "Cursor",
            Self::Query { .. } => "Query",
            Self::Configuration { .. } => "Configuration",
            Self::ScriptNotFound { .. } => "ScriptNotFound",
            Self::Io { .. } => "Io",
            Self::Serialization { .. } => "Serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = SqlProbeError::configuration("missing key 'server'");
        assert!(error.to_string().contains("missing key 'server'"));

        let error = SqlProbeError::script_not_found("scripts/missing.sql");
        assert!(error.to_string().contains("scripts/missing.sql"));
    }

    #[test]
    fn test_error_category_matches_variant() {
        let io = SqlProbeError::io(
            "read failed",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.category(), "Io");

        let cfg = SqlProbeError::configuration("bad");
        assert_eq!(cfg.category(), "Configuration");
    }

    #[test]
    fn test_error_source_is_chained() {
        use std::error::Error as _;

        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = SqlProbeError::io("open logs/sqlprobe.log", inner);

        assert!(error.source().is_some());
        assert!(error.to_string().contains("logs/sqlprobe.log"));
    }
}
