//! MongoDB connection lifecycle.
//!
//! A [`ConnectionManager`] owns the one authoritative [`ConnectionState`] of
//! a session and serialises every connect / disconnect onto it. Each
//! transition replaces the state and then emits a [`ConnectionEvent`]
//! carrying the new state, synchronously and in subscription order.
//!
//! # Handle ownership
//!
//! A backend handle belongs to the `Connected` state that introduced it.
//! Moving away from that state closes the handle. A connection attempt that
//! is superseded by a later `connect` or `disconnect` closes the handle it
//! produced instead of adopting it.
//!
//! Expected failures (bad host, authentication, timeout) never surface as
//! errors: they are represented by the `Errored` state.

mod auth;
mod state;

pub use auth::infer_auth_type;
pub use state::{
    AtlasClusterInfo, AuthType, ConnectionEvent, ConnectionEventKind, ConnectionState, OidcLogin,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::mongo::{ConnectRequest, Connector, OidcPrompt, OidcPromptSink, ServiceProvider};

/// Product name reported to the server as part of the driver `appName`.
pub const APP_NAME: &str = "mongodb-mcp-server";

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// MongoDB connection string.
    pub connection_string: String,
    /// Atlas cluster identity, when connecting to Atlas with a temporary user.
    pub atlas: Option<AtlasClusterInfo>,
}

impl ConnectionSettings {
    /// Settings for a plain connection string.
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            atlas: None,
        }
    }
}

/// Connection manager tuning.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// How long a connection attempt may take.
    pub connect_timeout: Duration,
    /// Prefer the browser OIDC flow over the device flow.
    pub browser_auth: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            browser_auth: false,
        }
    }
}

struct Slot {
    state: ConnectionState,
    generation: u64,
}

struct Inner {
    slot: Mutex<Slot>,
    events: EventBus<ConnectionEvent>,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    client_name: Mutex<Option<String>>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new generation and enters `state`. Returns the new
    /// generation and the state that was replaced.
    fn begin(&self, state: ConnectionState, kind: ConnectionEventKind) -> (u64, ConnectionState) {
        let (generation, previous) = {
            let mut slot = self.slot();
            slot.generation += 1;
            let previous = std::mem::replace(&mut slot.state, state.clone());
            (slot.generation, previous)
        };
        self.events.emit(&ConnectionEvent { kind, state });
        (generation, previous)
    }

    /// Enters `state` only if no later operation has started since
    /// `generation`. Returns the state that is current afterwards.
    fn finish(
        &self,
        generation: u64,
        state: ConnectionState,
        kind: ConnectionEventKind,
    ) -> Result<ConnectionState, ConnectionState> {
        {
            let mut slot = self.slot();
            if slot.generation != generation {
                return Err(slot.state.clone());
            }
            slot.state = state.clone();
        }
        self.events.emit(&ConnectionEvent {
            kind,
            state: state.clone(),
        });
        Ok(state)
    }

    fn record_oidc_prompt(&self, generation: u64, prompt: OidcPrompt) {
        let state = {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            let ConnectionState::Connecting { oidc_login, .. } = &mut slot.state else {
                return;
            };
            *oidc_login = Some(OidcLogin {
                login_url: prompt.login_url,
                user_code: prompt.user_code,
            });
            slot.state.clone()
        };
        self.events.emit(&ConnectionEvent {
            kind: ConnectionEventKind::Requested,
            state,
        });
    }

    fn app_name(&self) -> String {
        let client = self
            .client_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match client {
            Some(client) => format!("{APP_NAME} {} {client}", env!("CARGO_PKG_VERSION")),
            None => format!("{APP_NAME} {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Owns the connection state of one session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                }),
                events: EventBus::new(),
                connector,
                options,
                client_name: Mutex::new(None),
            }),
        }
    }

    /// Returns the current state without blocking on I/O.
    #[must_use]
    pub fn current_state(&self) -> ConnectionState {
        self.inner.slot().state.clone()
    }

    /// Returns the live handle, if connected.
    #[must_use]
    pub fn provider(&self) -> Option<Arc<dyn ServiceProvider>> {
        self.inner.slot().state.provider()
    }

    /// Transition events.
    #[must_use]
    pub fn events(&self) -> &EventBus<ConnectionEvent> {
        &self.inner.events
    }

    /// Records the MCP client name so it can be reported in the driver `appName`.
    pub fn set_client_name(&self, name: impl Into<String>) {
        *self
            .inner
            .client_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    /// Connects to `settings.connection_string`, replacing any current connection.
    ///
    /// Emits `connection-requested` immediately, closes the previous handle,
    /// then resolves to `Connected` (`connection-succeeded`), `Errored`
    /// (`connection-errored`) or, when the connect timeout elapses,
    /// `Errored` (`connection-timed-out`). If another `connect` or
    /// `disconnect` starts while this one is pending, the handle this call
    /// produces is closed and the state current at that time is returned.
    pub async fn connect(&self, settings: ConnectionSettings) -> ConnectionState {
        let auth_type = infer_auth_type(&settings.connection_string, self.inner.options.browser_auth);
        let (generation, previous) = self.inner.begin(
            ConnectionState::Connecting {
                auth_type,
                atlas: settings.atlas.clone(),
                oidc_login: None,
            },
            ConnectionEventKind::Requested,
        );
        info!(auth_type = %auth_type, "Connecting to MongoDB");

        if let Some(provider) = previous.provider() {
            close_quietly(provider.as_ref()).await;
        }

        let request = ConnectRequest {
            connection_string: settings.connection_string,
            app_name: self.inner.app_name(),
            auth_type,
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let prompts: OidcPromptSink = Arc::new(move |prompt| {
            if let Some(inner) = weak.upgrade() {
                inner.record_oidc_prompt(generation, prompt);
            }
        });

        let timeout = self.inner.options.connect_timeout;
        let attempt =
            tokio::time::timeout(timeout, self.inner.connector.connect(&request, prompts)).await;

        let (state, kind) = match attempt {
            Ok(Ok(provider)) => {
                let state = ConnectionState::Connected {
                    provider: Arc::clone(&provider),
                    auth_type: Some(auth_type),
                    atlas: settings.atlas,
                };
                return match self
                    .inner
                    .finish(generation, state, ConnectionEventKind::Succeeded)
                {
                    Ok(state) => {
                        info!("Connected to MongoDB");
                        state
                    }
                    Err(current) => {
                        debug!("Connection attempt superseded, closing its handle");
                        close_quietly(provider.as_ref()).await;
                        current
                    }
                };
            }
            Ok(Err(error)) => {
                warn!(error = %error, "MongoDB connection failed");
                (
                    ConnectionState::Errored {
                        reason: error.message,
                    },
                    ConnectionEventKind::Errored,
                )
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "MongoDB connection timed out");
                (
                    ConnectionState::Errored {
                        reason: format!(
                            "Connection timed out after {} ms",
                            timeout.as_millis()
                        ),
                    },
                    ConnectionEventKind::TimedOut,
                )
            }
        };

        self.inner
            .finish(generation, state, kind)
            .unwrap_or_else(|current| current)
    }

    /// Closes the current connection.
    ///
    /// A no-op when already `Disconnected`. Otherwise resolves to
    /// `Disconnected` (`connection-closed`), or to `Errored`
    /// (`connection-errored`) if closing the handle failed. A pending
    /// connection attempt is abandoned and an earlier error is cleared.
    pub async fn disconnect(&self) -> ConnectionState {
        let (generation, provider) = {
            let mut slot = self.inner.slot();
            match &slot.state {
                ConnectionState::Disconnected => return slot.state.clone(),
                state => {
                    let provider = state.provider();
                    slot.generation += 1;
                    (slot.generation, provider)
                }
            }
        };

        let (state, kind) = match provider {
            Some(provider) => match provider.close().await {
                Ok(()) => (ConnectionState::Disconnected, ConnectionEventKind::Closed),
                Err(error) => {
                    warn!(error = %error, "Failed to close MongoDB connection");
                    (
                        ConnectionState::Errored {
                            reason: format!("Failed to close connection: {}", error.message),
                        },
                        ConnectionEventKind::Errored,
                    )
                }
            },
            None => (ConnectionState::Disconnected, ConnectionEventKind::Closed),
        };

        info!(state = state.tag(), "Disconnected from MongoDB");
        self.inner
            .finish(generation, state, kind)
            .unwrap_or_else(|current| current)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.current_state())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

async fn close_quietly(provider: &dyn ServiceProvider) {
    if let Err(error) = provider.close().await {
        warn!(error = %error, "Failed to close previous MongoDB connection");
    }
}
