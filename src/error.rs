//! Error types for mongodb-mcp-server.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Connection strings and Atlas secrets are not embedded in any variant;
//! configuration errors only name the offending field.

use std::path::PathBuf;

use thiserror::Error;

use crate::atlas::ApiError;
use crate::atlas_local::AtlasLocalError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Server error code names the tools translate into friendly messages.
pub mod code_names {
    /// The database or collection does not exist.
    pub const NAMESPACE_NOT_FOUND: &str = "NamespaceNotFound";
    /// The target namespace of a rename already exists.
    pub const NAMESPACE_EXISTS: &str = "NamespaceExists";
    /// The deployment has no search support (not Atlas, not a local Atlas deployment).
    pub const SEARCH_NOT_ENABLED: &str = "SearchNotEnabled";
}

/// An error reported by the MongoDB backend.
///
/// Server-side command failures keep their numeric code and code name so
/// tools can recognise well-known conditions without string matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// Numeric server error code, if the server produced one.
    pub code: Option<i32>,
    /// Symbolic server error code name (e.g. `NamespaceNotFound`).
    pub code_name: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl BackendError {
    /// Creates an error without a server code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            code_name: None,
            message: message.into(),
        }
    }

    /// Creates an error carrying a server code and code name.
    #[must_use]
    pub fn with_code(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            code_name: Some(code_name.into()),
            message: message.into(),
        }
    }

    /// Returns `true` if the server reported the given code name.
    #[must_use]
    pub fn has_code_name(&self, name: &str) -> bool {
        self.code_name.as_deref() == Some(name)
    }
}

impl From<mongodb::error::Error> for BackendError {
    fn from(error: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match error.kind.as_ref() {
            ErrorKind::Command(command) => Self::with_code(
                command.code,
                command.code_name.clone(),
                command.message.clone(),
            ),
            ErrorKind::Write(WriteFailure::WriteError(write)) => Self {
                code: Some(write.code),
                code_name: write.code_name.clone(),
                message: write.message.clone(),
            },
            _ => Self::new(error.to_string()),
        }
    }
}

impl From<bson::ser::Error> for BackendError {
    fn from(error: bson::ser::Error) -> Self {
        Self::new(format!("failed to encode BSON: {error}"))
    }
}

/// Errors produced while executing a tool.
///
/// The tool pipeline converts every variant into a tool result; none of
/// them escape to the JSON-RPC layer.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The arguments did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool needs a live MongoDB connection and there is none.
    #[error("{reason}")]
    NotConnected {
        /// Why no connection is available, including what the user can do.
        reason: String,
    },

    /// Index checking is enabled and the query would scan the whole collection.
    #[error(
        "Index check failed: The {operation} operation on \"{namespace}\" performs a collection scan (COLLSCAN) instead of using an index. Consider adding an index for better performance. Use 'explain' tool for query plan analysis or 'collection-indexes' to view existing indexes. To disable this check, set index_check to false."
    )]
    ForbiddenCollscan {
        /// The operation that was checked (`find`, `count`, ...).
        operation: String,
        /// `database.collection`.
        namespace: String,
    },

    /// A write was requested while the server runs in read-only mode.
    #[error("{0}")]
    ForbiddenWriteOperation(String),

    /// Connecting to MongoDB failed.
    #[error("{0}")]
    Connection(String),

    /// The MongoDB backend reported an error.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The Atlas Admin API reported an error.
    #[error(transparent)]
    Atlas(#[from] ApiError),

    /// The local deployment manager reported an error.
    #[error(transparent)]
    AtlasLocal(#[from] AtlasLocalError),
}

impl ToolError {
    /// Returns the backend error if this is one.
    #[must_use]
    pub const fn as_backend(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn backend_error_code_name() {
        let error = BackendError::with_code(26, code_names::NAMESPACE_NOT_FOUND, "ns not found");
        assert!(error.has_code_name(code_names::NAMESPACE_NOT_FOUND));
        assert!(!error.has_code_name(code_names::SEARCH_NOT_ENABLED));
        assert_eq!(error.to_string(), "ns not found");
    }

    #[test]
    fn collscan_message_names_namespace() {
        let error = ToolError::ForbiddenCollscan {
            operation: "find".to_string(),
            namespace: "shop.orders".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.starts_with("Index check failed"));
        assert!(msg.contains("\"shop.orders\""));
    }
}
