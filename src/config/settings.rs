//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Default Atlas Admin API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://cloud.mongodb.com/";

/// Tools that ask the user for confirmation unless configured otherwise.
pub const DEFAULT_CONFIRMATION_REQUIRED_TOOLS: [&str; 6] = [
    "atlas-create-access-list",
    "atlas-create-db-user",
    "drop-database",
    "drop-collection",
    "delete-many",
    "drop-index",
];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored).
    #[serde(rename = "$schema", default)]
    pub schema: Option<String>,

    /// Optional comment field (ignored).
    #[serde(rename = "_comment", default)]
    pub comment: Option<String>,

    /// MongoDB connection string used when a tool needs a connection and
    /// none has been established yet.
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Atlas Admin API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Atlas service account client ID.
    #[serde(default)]
    pub api_client_id: Option<String>,

    /// Atlas service account client secret.
    #[serde(default)]
    pub api_client_secret: Option<String>,

    /// Only register `read`, `metadata` and `connect` tools.
    #[serde(default)]
    pub read_only: bool,

    /// Reject queries that would perform a collection scan.
    #[serde(default)]
    pub index_check: bool,

    /// Tool names, categories or operation kinds that are not registered.
    #[serde(default)]
    pub disabled_tools: Vec<String>,

    /// Tool names that require user confirmation before running.
    #[serde(default = "default_confirmation_required_tools")]
    pub confirmation_required_tools: Vec<String>,

    /// Maximum number of documents returned by `find` / `aggregate`.
    #[serde(default = "default_max_documents_per_query")]
    pub max_documents_per_query: u64,

    /// Byte ceiling for documents returned by `find` / `aggregate`.
    /// Zero or negative disables the ceiling.
    #[serde(default = "default_max_bytes_per_query")]
    pub max_bytes_per_query: i64,

    /// How long a connection attempt may take before it is abandoned.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Disconnect from MongoDB after this much inactivity. Zero disables it.
    #[serde(default)]
    pub idle_timeout_ms: u64,

    /// Use the browser-based OIDC flow instead of the device flow.
    #[serde(default)]
    pub browser: bool,

    /// Lifetime of temporary database users created by `atlas-connect-cluster`.
    #[serde(default = "default_temporary_user_lifetime_ms")]
    pub atlas_temporary_database_user_lifetime_ms: u64,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "connect_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.max_documents_per_query == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_documents_per_query must be greater than 0".to_string(),
            });
        }

        if self.api_client_id.is_some() != self.api_client_secret.is_some() {
            return Err(ConfigError::ValidationError {
                message: "api_client_id and api_client_secret must be set together".to_string(),
            });
        }

        if self.disabled_tools.iter().any(|entry| entry.trim().is_empty()) {
            return Err(ConfigError::ValidationError {
                message: "disabled_tools must not contain empty entries".to_string(),
            });
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid api_base_url '{}'. Must start with http:// or https://",
                    self.api_base_url
                ),
            });
        }

        Ok(())
    }

    /// Returns `true` if Atlas service account credentials are configured.
    #[must_use]
    pub const fn has_atlas_credentials(&self) -> bool {
        self.api_client_id.is_some() && self.api_client_secret.is_some()
    }

    /// Returns `true` if `tool` must be confirmed by the user.
    #[must_use]
    pub fn requires_confirmation(&self, tool: &str) -> bool {
        self.confirmation_required_tools.iter().any(|name| name == tool)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: None,
            comment: None,
            connection_string: None,
            api_base_url: default_api_base_url(),
            api_client_id: None,
            api_client_secret: None,
            read_only: false,
            index_check: false,
            disabled_tools: Vec::new(),
            confirmation_required_tools: default_confirmation_required_tools(),
            max_documents_per_query: default_max_documents_per_query(),
            max_bytes_per_query: default_max_bytes_per_query(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: 0,
            browser: false,
            atlas_temporary_database_user_lifetime_ms: default_temporary_user_lifetime_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Default: "warn"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_confirmation_required_tools() -> Vec<String> {
    DEFAULT_CONFIRMATION_REQUIRED_TOOLS
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_max_documents_per_query() -> u64 {
    100
}

const fn default_max_bytes_per_query() -> i64 {
    16 * 1024 * 1024
}

const fn default_connect_timeout_ms() -> u64 {
    30_000
}

const fn default_temporary_user_lifetime_ms() -> u64 {
    4 * 60 * 60 * 1000
}

fn default_log_level() -> String {
    "warn".to_string()
}
