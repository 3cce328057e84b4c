//! Error types for installrecord.
//!
//! This module defines the errors surfaced by setup-time and offline
//! operations (configuration, storage, migration setup). Per-request outcomes
//! of the record store have their own typed error in [`crate::backend`].

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for installrecord operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// A table or column name cannot be embedded in SQL.
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Migration Setup Errors ===
    /// None of the configured credentials were accepted by the target.
    #[error("authentication against {target} failed: {message}")]
    Authentication {
        /// Base URL of the record store.
        target: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The target record store could not be reached or refused access.
    #[error("target {target} is unavailable: {message}")]
    TargetUnavailable {
        /// Base URL of the record store.
        target: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The legacy source could not provide its summary.
    #[error("legacy source {source_url} failed: {message}")]
    Source {
        /// Base URL of the legacy source.
        source_url: String,
        /// Description of what went wrong.
        message: String,
    },

    /// An HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read an input file.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An export file did not have the expected shape.
    #[error("malformed export: {0}")]
    MalformedExport(String),
}

/// A specialized Result type for installrecord operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn authentication(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a target-unavailable error.
    #[must_use]
    pub fn target_unavailable(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Check whether this error aborts a migration before any transfer.
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. }
                | Self::TargetUnavailable { .. }
                | Self::Source { .. }
                | Self::ConfigValidation { .. }
                | Self::HttpClient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_error_display() {
        let err = Error::authentication("http://db.local", "bad password");
        let msg = err.to_string();
        assert!(msg.contains("http://db.local"));
        assert!(msg.contains("bad password"));
    }

    #[test]
    fn test_target_unavailable_display() {
        let err = Error::target_unavailable("http://db.local", "connection refused");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_is_setup_error() {
        assert!(Error::authentication("x", "y").is_setup_error());
        assert!(Error::target_unavailable("x", "y").is_setup_error());
        assert!(Error::config("batch_size").is_setup_error());
        assert!(!Error::InvalidIdentifier("a b".to_string()).is_setup_error());
    }

    #[test]
    fn test_invalid_identifier_display() {
        let err = Error::InvalidIdentifier("drop table".to_string());
        assert_eq!(err.to_string(), "invalid SQL identifier: \"drop table\"");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::config("batch_size must be greater than 0");
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_file_read_error_display() {
        let err = Error::FileRead {
            path: PathBuf::from("/tmp/export.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/export.json"));
    }
}
