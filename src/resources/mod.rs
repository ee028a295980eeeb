//! Read-only MCP resources derived from session events.
//!
//! A resource is a pure fold: it starts from an initial value, and each
//! session event it subscribes to replaces the value with
//! `reduce(previous, event)`. Reads render the current value with
//! `to_output`. After every change the registry tells the client through
//! `notifications/resources/updated` (subscribed URIs only) and
//! `notifications/resources/list_changed`.
//!
//! # Modules
//!
//! - [`debug`]: Connection status for troubleshooting
//! - [`config`]: Effective configuration with secrets redacted

pub mod config;
pub mod debug;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;
use tracing::debug;

use crate::session::{Session, SessionEvent, SessionEventKind};

pub use config::ConfigResource;
pub use debug::DebugResource;

/// MIME type of every resource body.
pub const RESOURCE_MIME_TYPE: &str = "application/json";

/// The event-folding behaviour of one resource.
pub trait ResourceReducer: Send + Sync + 'static {
    /// State folded from events.
    type Value: Send + 'static;

    /// Short resource name.
    fn name(&self) -> &'static str;

    /// Resource URI.
    fn uri(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Value before any event.
    fn initial(&self) -> Self::Value;

    /// Session events that trigger a reduction.
    fn events(&self) -> &'static [SessionEventKind];

    /// Computes the next value. Must be total over every subscribed event.
    fn reduce(&self, previous: &Self::Value, event: &SessionEvent) -> Self::Value;

    /// Renders a value. Deterministic and side-effect free.
    fn to_output(&self, value: &Self::Value) -> String;
}

/// A registered resource as seen by the protocol layer.
pub trait Resource: Send + Sync {
    /// Short resource name.
    fn name(&self) -> &'static str;

    /// Resource URI.
    fn uri(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Renders the current value.
    fn read(&self) -> String;
}

/// A [`ResourceReducer`] bound to its current value.
pub struct ReactiveResource<R: ResourceReducer> {
    reducer: R,
    current: Mutex<R::Value>,
}

impl<R: ResourceReducer> ReactiveResource<R> {
    /// Creates the resource and subscribes it to `session`'s events.
    ///
    /// `on_change` runs after every reduction with the resource URI.
    pub fn attach(
        reducer: R,
        session: &Session,
        on_change: Arc<dyn Fn(&'static str) + Send + Sync>,
    ) -> Arc<Self> {
        let resource = Arc::new(Self {
            current: Mutex::new(reducer.initial()),
            reducer,
        });

        for kind in resource.reducer.events() {
            let weak = Arc::downgrade(&resource);
            let on_change = Arc::clone(&on_change);
            session.events().on(*kind, move |event: &SessionEvent| {
                if let Some(resource) = weak.upgrade() {
                    resource.apply(event);
                    on_change(resource.reducer.uri());
                }
            });
        }
        resource
    }

    /// Folds one event into the current value.
    pub fn apply(&self, event: &SessionEvent) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.reducer.reduce(&current, event);
        *current = next;
    }
}

impl<R: ResourceReducer> Resource for ReactiveResource<R> {
    fn name(&self) -> &'static str {
        self.reducer.name()
    }

    fn uri(&self) -> &'static str {
        self.reducer.uri()
    }

    fn description(&self) -> &'static str {
        self.reducer.description()
    }

    fn read(&self) -> String {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.reducer.to_output(&current)
    }
}

/// Entry of a `resources/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,
    /// Short name.
    pub name: String,
    /// Description.
    pub description: String,
    /// MIME type of the body.
    pub mime_type: String,
}

/// Body of a `resources/read` response entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type of `text`.
    pub mime_type: String,
    /// Rendered value.
    pub text: String,
}

/// Notifications the registry asks the protocol layer to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNotification {
    /// `notifications/resources/updated` for a subscribed URI.
    Updated(String),
    /// `notifications/resources/list_changed`.
    ListChanged,
}

/// Sink for [`ResourceNotification`]s.
pub type ResourceNotifier = Arc<dyn Fn(ResourceNotification) + Send + Sync>;

/// Every resource of the server plus client subscriptions.
pub struct ResourceRegistry {
    resources: Vec<Arc<dyn Resource>>,
    subscriptions: Mutex<BTreeSet<String>>,
    notifier: Mutex<Option<ResourceNotifier>>,
}

impl ResourceRegistry {
    /// Creates the `config` and `debug` resources for `session`.
    #[must_use]
    pub fn new(session: &Session) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let on_change: Arc<dyn Fn(&'static str) + Send + Sync> = Arc::new(move |uri| {
                if let Some(registry) = weak.upgrade() {
                    registry.changed(uri);
                }
            });

            let config: Arc<dyn Resource> = ReactiveResource::attach(
                ConfigResource::new(session.config_arc()),
                session,
                Arc::clone(&on_change),
            );
            let debug: Arc<dyn Resource> =
                ReactiveResource::attach(DebugResource, session, on_change);

            Self {
                resources: vec![config, debug],
                subscriptions: Mutex::new(BTreeSet::new()),
                notifier: Mutex::new(None),
            }
        })
    }

    /// Routes change notifications to `notifier`.
    pub fn set_notifier(&self, notifier: ResourceNotifier) {
        *self.notifier.lock().unwrap_or_else(PoisonError::into_inner) = Some(notifier);
    }

    /// Lists every resource.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceDescriptor> {
        self.resources
            .iter()
            .map(|resource| ResourceDescriptor {
                uri: resource.uri().to_string(),
                name: resource.name().to_string(),
                description: resource.description().to_string(),
                mime_type: RESOURCE_MIME_TYPE.to_string(),
            })
            .collect()
    }

    /// Renders the resource at `uri`, or `None` if there is none.
    #[must_use]
    pub fn read(&self, uri: &str) -> Option<ResourceContents> {
        self.find(uri).map(|resource| ResourceContents {
            uri: uri.to_string(),
            mime_type: RESOURCE_MIME_TYPE.to_string(),
            text: resource.read(),
        })
    }

    /// Subscribes the client to updates of `uri`. Returns `false` for unknown URIs.
    pub fn subscribe(&self, uri: &str) -> bool {
        if self.find(uri).is_none() {
            return false;
        }
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string());
        true
    }

    /// Removes a subscription. Returns `false` if there was none.
    pub fn unsubscribe(&self, uri: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
    }

    fn find(&self, uri: &str) -> Option<&Arc<dyn Resource>> {
        self.resources.iter().find(|resource| resource.uri() == uri)
    }

    fn changed(&self, uri: &'static str) {
        let subscribed = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(uri);
        let notifier = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!(uri, subscribed, "Resource updated");
        if let Some(notify) = notifier {
            if subscribed {
                notify(ResourceNotification::Updated(uri.to_string()));
            }
            notify(ResourceNotification::ListChanged);
        }
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field(
                "resources",
                &self.resources.iter().map(|r| r.uri()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
