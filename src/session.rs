//! Per-server session state.
//!
//! A [`Session`] is constructed once in `main` and shared by the tools, the
//! resources and the protocol server. It bundles the connection manager, the
//! optional Atlas API client, the optional local deployment client and the
//! effective configuration, and re-publishes connection transitions as the
//! coarser [`SessionEvent`]s the rest of the server reacts to.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::atlas::ApiClient;
use crate::atlas_local::AtlasLocalClient;
use crate::config::Config;
use crate::connection::{
    ConnectionEvent, ConnectionEventKind, ConnectionManager, ConnectionSettings, ConnectionState,
};
use crate::error::ToolError;
use crate::events::{Event, EventBus};
use crate::mongo::ServiceProvider;

/// Message returned when a tool needs MongoDB and no connection exists.
pub const NOT_CONNECTED_MESSAGE: &str = "You need to connect to a MongoDB instance before you can access its data. Use the 'connect' tool with a connection string, or 'atlas-connect-cluster' / 'atlas-local-connect-deployment' to connect to a deployment.";

/// Session-level events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A MongoDB connection was established.
    Connected,
    /// The MongoDB connection was closed.
    Disconnect,
    /// The session is shutting down.
    Close,
    /// Connecting failed or timed out.
    ConnectionError(String),
}

/// Names of [`SessionEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// `connected`
    Connected,
    /// `disconnect`
    Disconnect,
    /// `close`
    Close,
    /// `connection-error`
    ConnectionError,
}

impl SessionEventKind {
    /// Returns the event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnect => "disconnect",
            Self::Close => "close",
            Self::ConnectionError => "connection-error",
        }
    }
}

impl Event for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> Self::Kind {
        match self {
            Self::Connected => SessionEventKind::Connected,
            Self::Disconnect => SessionEventKind::Disconnect,
            Self::Close => SessionEventKind::Close,
            Self::ConnectionError(_) => SessionEventKind::ConnectionError,
        }
    }
}

/// Shared state of one server instance.
pub struct Session {
    config: Arc<Config>,
    connection: ConnectionManager,
    api_client: Option<Arc<ApiClient>>,
    atlas_local: Option<Arc<dyn AtlasLocalClient>>,
    events: Arc<EventBus<SessionEvent>>,
}

impl Session {
    /// Creates a session and subscribes it to `connection`'s transitions.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        connection: ConnectionManager,
        api_client: Option<Arc<ApiClient>>,
        atlas_local: Option<Arc<dyn AtlasLocalClient>>,
    ) -> Arc<Self> {
        let events = Arc::new(EventBus::new());

        let bus = Arc::clone(&events);
        connection.events().on_any(move |event: &ConnectionEvent| {
            if let Some(session_event) = session_event_for(event) {
                bus.emit(&session_event);
            }
        });

        Arc::new(Self {
            config,
            connection,
            api_client,
            atlas_local,
            events,
        })
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the effective configuration.
    #[must_use]
    pub fn config_arc(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The connection manager.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The Atlas API client, when credentials are configured.
    #[must_use]
    pub fn api_client(&self) -> Option<&ApiClient> {
        self.api_client.as_deref()
    }

    /// The local deployment client, when Docker is available.
    #[must_use]
    pub fn atlas_local(&self) -> Option<&dyn AtlasLocalClient> {
        self.atlas_local.as_deref()
    }

    /// Session events.
    #[must_use]
    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.events
    }

    /// Connects to MongoDB, replacing any current connection.
    pub async fn connect(&self, settings: ConnectionSettings) -> ConnectionState {
        self.connection.connect(settings).await
    }

    /// Returns the live backend handle, connecting with the configured
    /// connection string first if there is no connection yet.
    ///
    /// The handle must not be kept beyond the current operation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotConnected`] if there is no connection and
    /// none could be established.
    pub async fn ensure_connected(&self) -> Result<Arc<dyn ServiceProvider>, ToolError> {
        let mut state = self.connection.current_state();

        if matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Errored { .. }
        ) {
            if let Some(connection_string) = self.config.connection_string.as_deref() {
                debug!("Connecting with the configured connection string");
                state = self
                    .connection
                    .connect(ConnectionSettings::new(connection_string))
                    .await;
            }
        }

        match state {
            ConnectionState::Connected { provider, .. } => Ok(provider),
            ConnectionState::Connecting {
                oidc_login: Some(login),
                ..
            } => Err(ToolError::NotConnected {
                reason: format!(
                    "The user needs to finish the OIDC connection by opening '{}' in the browser and using the code '{}'. Retry the operation once the login is complete.",
                    login.login_url, login.user_code
                ),
            }),
            ConnectionState::Connecting { .. } => Err(ToolError::NotConnected {
                reason: "The connection to MongoDB is still being established. Retry in a few seconds.".to_string(),
            }),
            ConnectionState::Errored { reason } => Err(ToolError::NotConnected {
                reason: format!("{NOT_CONNECTED_MESSAGE} The last connection attempt failed: {reason}"),
            }),
            ConnectionState::Disconnected => Err(ToolError::NotConnected {
                reason: NOT_CONNECTED_MESSAGE.to_string(),
            }),
        }
    }

    /// Closes the MongoDB connection.
    ///
    /// A temporary Atlas database user created for the connection is deleted
    /// in the background.
    pub async fn disconnect(&self) -> ConnectionState {
        let atlas = self.connection.current_state().atlas().cloned();
        let state = self.connection.disconnect().await;

        if let (Some(atlas), Some(api)) = (atlas, self.api_client.clone()) {
            tokio::spawn(async move {
                if let Err(error) = api
                    .delete_database_user(&atlas.project_id, &atlas.username)
                    .await
                {
                    warn!(error = %error, "Failed to delete temporary Atlas database user");
                }
            });
        }
        state
    }

    /// Disconnects and announces that the session is closing.
    pub async fn close(&self) {
        self.disconnect().await;
        self.events.emit(&SessionEvent::Close);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("atlas", &self.api_client.is_some())
            .field("atlas_local", &self.atlas_local.is_some())
            .finish_non_exhaustive()
    }
}

fn session_event_for(event: &ConnectionEvent) -> Option<SessionEvent> {
    match (event.kind, &event.state) {
        (ConnectionEventKind::Succeeded, _) => Some(SessionEvent::Connected),
        (ConnectionEventKind::Closed, _) => Some(SessionEvent::Disconnect),
        (
            ConnectionEventKind::Errored | ConnectionEventKind::TimedOut,
            ConnectionState::Errored { reason },
        ) => Some(SessionEvent::ConnectionError(reason.clone())),
        (ConnectionEventKind::Errored | ConnectionEventKind::TimedOut, _) => {
            Some(SessionEvent::ConnectionError("unknown error".to_string()))
        }
        (ConnectionEventKind::Requested, _) => None,
    }
}
