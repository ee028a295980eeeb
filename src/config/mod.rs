//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via the `CONFIG_FILE` CLI argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.mongodb-mcp-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.mongodb-mcp-server\config.json`
//!
//! A missing file at the default location is not an error: the server then
//! runs with defaults. Values from the command line and the `MDB_MCP_*`
//! environment variables take precedence over the file.

mod settings;

pub use settings::{
    Config, LoggingConfig, DEFAULT_API_BASE_URL, DEFAULT_CONFIRMATION_REQUIRED_TOOLS,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mongodb-mcp-server/`
/// - **Windows:** `%USERPROFILE%\.mongodb-mcp-server\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mongodb-mcp-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Values supplied on the command line or through the environment.
///
/// `None` / `false` leave the file value untouched.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// MongoDB connection string.
    pub connection_string: Option<String>,
    /// Atlas service account client ID.
    pub api_client_id: Option<String>,
    /// Atlas service account client secret.
    pub api_client_secret: Option<String>,
    /// Force read-only mode.
    pub read_only: bool,
    /// Additional disabled tools, categories or operation kinds.
    pub disabled_tools: Vec<String>,
}

impl Config {
    /// Applies command line / environment overrides on top of the file values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if overrides.connection_string.is_some() {
            self.connection_string = overrides.connection_string;
        }
        if overrides.api_client_id.is_some() {
            self.api_client_id = overrides.api_client_id;
        }
        if overrides.api_client_secret.is_some() {
            self.api_client_secret = overrides.api_client_secret;
        }
        self.read_only |= overrides.read_only;
        self.disabled_tools.extend(overrides.disabled_tools);
        self
    }
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to [`Config::default`] when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}
