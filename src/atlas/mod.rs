//! MongoDB Atlas Admin API.
//!
//! # Modules
//!
//! - [`api_client`]: Authenticated HTTP client
//! - [`models`]: Request and response payloads
//! - [`access_list`]: Adding the caller's IP to a project access list

pub mod access_list;
pub mod api_client;
pub mod models;

pub use access_list::ensure_current_ip_in_access_list;
pub use api_client::ApiClient;

use thiserror::Error;

/// Errors returned by the Atlas Admin API client.
///
/// Messages never include the service account secret.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request could not be sent or the response not decoded.
    #[error("error calling Atlas API: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("error calling Atlas API: [{status}] {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Status text and response body.
        message: String,
    },

    /// The service account credentials were rejected.
    #[error("failed to obtain Atlas access token: {0}")]
    Auth(String),

    /// Something the API returned was unusable.
    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    /// Returns the HTTP status code, if the API answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            Self::Auth(_) | Self::Unexpected(_) => None,
        }
    }
}
