//! Typed publish/subscribe.
//!
//! An [`EventBus`] delivers a closed event enum to its subscribers
//! synchronously, in subscription order, on the task that emits. Listeners
//! are invoked after the internal lock is released, so a listener may
//! subscribe, unsubscribe or emit on the same bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An event with a discriminant that listeners can filter on.
pub trait Event {
    /// The event name type, usually a fieldless enum.
    type Kind: Copy + Eq + Send + Sync + 'static;

    /// Returns the name of this event.
    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`EventBus::on`] and [`EventBus::once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E: Event> {
    id: SubscriptionId,
    kind: Option<E::Kind>,
    once: bool,
    callback: Callback<E>,
}

/// Observer list for events of type `E`.
pub struct EventBus<E: Event> {
    listeners: Mutex<Vec<Listener<E>>>,
    next_id: AtomicU64,
}

impl<E: Event> EventBus<E> {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes to every occurrence of `kind`.
    pub fn on(&self, kind: E::Kind, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        self.add(Some(kind), false, Arc::new(callback))
    }

    /// Subscribes to the next occurrence of `kind` only.
    pub fn once(
        &self,
        kind: E::Kind,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(Some(kind), true, Arc::new(callback))
    }

    /// Subscribes to every event regardless of kind.
    pub fn on_any(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        self.add(None, false, Arc::new(callback))
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    /// Delivers `event` to all matching subscribers in subscription order.
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let callbacks: Vec<Callback<E>> = {
            let mut listeners = self.lock();
            let matching = listeners
                .iter()
                .filter(|listener| listener.kind.map_or(true, |k| k == kind))
                .map(|listener| Arc::clone(&listener.callback))
                .collect();
            listeners.retain(|listener| !(listener.once && listener.kind == Some(kind)));
            matching
        };

        for callback in callbacks {
            callback(event);
        }
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn add(&self, kind: Option<E::Kind>, once: bool, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Listener {
            id,
            kind,
            once,
            callback,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener<E>>> {
        // A panicking listener never runs under the lock, so the list stays consistent.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
