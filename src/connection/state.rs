//! Connection states and transition events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::Event;
use crate::mongo::ServiceProvider;

/// Authentication mechanism inferred from a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuthType {
    /// Username / password (SCRAM).
    #[serde(rename = "scram")]
    Scram,
    /// LDAP (`PLAIN` against `$external`).
    #[serde(rename = "ldap")]
    Ldap,
    /// Kerberos (`GSSAPI`).
    #[serde(rename = "kerberos")]
    Kerberos,
    /// X.509 client certificates.
    #[serde(rename = "x.509")]
    X509,
    /// OIDC authorization-code flow in a browser.
    #[serde(rename = "oidc-auth-flow")]
    OidcAuthFlow,
    /// OIDC device-authorization flow.
    #[serde(rename = "oidc-device-flow")]
    OidcDeviceFlow,
}

impl AuthType {
    /// Returns the wire name of this mechanism.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scram => "scram",
            Self::Ldap => "ldap",
            Self::Kerberos => "kerberos",
            Self::X509 => "x.509",
            Self::OidcAuthFlow => "oidc-auth-flow",
            Self::OidcDeviceFlow => "oidc-device-flow",
        }
    }

    /// Returns `true` for either OIDC flow.
    #[must_use]
    pub const fn is_oidc(self) -> bool {
        matches!(self, Self::OidcAuthFlow | Self::OidcDeviceFlow)
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an Atlas cluster reached through a temporary database user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasClusterInfo {
    /// Temporary database user name.
    pub username: String,
    /// Atlas project (group) ID.
    pub project_id: String,
    /// Cluster name.
    pub cluster_name: String,
    /// When the temporary user's credentials expire.
    pub expiry_date: DateTime<Utc>,
}

/// Pending interactive login for an OIDC device flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcLogin {
    /// URL the user must open.
    pub login_url: String,
    /// Code the user must enter.
    pub user_code: String,
}

/// The single authoritative connection state of a session.
#[derive(Clone)]
pub enum ConnectionState {
    /// No backend handle.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting {
        /// Inferred authentication mechanism.
        auth_type: AuthType,
        /// Atlas cluster identity, when connecting to Atlas.
        atlas: Option<AtlasClusterInfo>,
        /// Login prompt of an OIDC device flow, once the driver reports it.
        oidc_login: Option<OidcLogin>,
    },
    /// Connected with a live backend handle.
    Connected {
        /// The live handle. Owned by this state; closed when it is superseded.
        provider: Arc<dyn ServiceProvider>,
        /// Authentication mechanism in use.
        auth_type: Option<AuthType>,
        /// Atlas cluster identity, when connected to Atlas.
        atlas: Option<AtlasClusterInfo>,
    },
    /// The last attempt failed.
    Errored {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ConnectionState {
    /// Returns the state tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::Errored { .. } => "errored",
        }
    }

    /// Returns the live handle when connected.
    #[must_use]
    pub fn provider(&self) -> Option<Arc<dyn ServiceProvider>> {
        match self {
            Self::Connected { provider, .. } => Some(Arc::clone(provider)),
            _ => None,
        }
    }

    /// Returns the Atlas cluster identity, if any.
    #[must_use]
    pub const fn atlas(&self) -> Option<&AtlasClusterInfo> {
        match self {
            Self::Connecting { atlas, .. } | Self::Connected { atlas, .. } => atlas.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` when connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Connecting {
                auth_type,
                atlas,
                oidc_login,
            } => f
                .debug_struct("Connecting")
                .field("auth_type", auth_type)
                .field("atlas", atlas)
                .field("oidc_login", oidc_login)
                .finish(),
            Self::Connected {
                auth_type, atlas, ..
            } => f
                .debug_struct("Connected")
                .field("auth_type", auth_type)
                .field("atlas", atlas)
                .finish_non_exhaustive(),
            Self::Errored { reason } => f.debug_struct("Errored").field("reason", reason).finish(),
        }
    }
}

/// Names of connection transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEventKind {
    /// `connection-requested`
    Requested,
    /// `connection-succeeded`
    Succeeded,
    /// `connection-timed-out`
    TimedOut,
    /// `connection-closed`
    Closed,
    /// `connection-errored`
    Errored,
}

impl ConnectionEventKind {
    /// Returns the event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "connection-requested",
            Self::Succeeded => "connection-succeeded",
            Self::TimedOut => "connection-timed-out",
            Self::Closed => "connection-closed",
            Self::Errored => "connection-errored",
        }
    }
}

/// A transition, carrying the full new state.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// Which transition happened.
    pub kind: ConnectionEventKind,
    /// The state after the transition.
    pub state: ConnectionState,
}

impl Event for ConnectionEvent {
    type Kind = ConnectionEventKind;

    fn kind(&self) -> Self::Kind {
        self.kind
    }
}
