//! Messages from the server to the client.
//!
//! Responses, notifications and server-originated requests are serialised
//! here and queued for the writer task. Requests register a oneshot slot that
//! is completed when the matching reply is read from the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::protocol::{JsonRpcErrorData, JsonRpcReply, OutgoingNotification, OutgoingRequest, RequestId};

/// Why a server-originated request produced no result.
#[derive(Error, Debug)]
pub enum OutboundError {
    /// The client answered with an error.
    #[error("client error {}: {}", .0.code, .0.message)]
    Client(JsonRpcErrorData),

    /// The connection closed before the client answered.
    #[error("connection closed")]
    Closed,
}

type Pending = HashMap<RequestId, oneshot::Sender<Result<Value, JsonRpcErrorData>>>;

/// Queue of outgoing messages shared by every task of the server.
pub struct Outbound {
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<Pending>,
    next_id: AtomicI64,
}

impl Outbound {
    /// Creates the queue and the receiving end the writer drains.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        });
        (outbound, rx)
    }

    /// Serialises and queues `message`. Returns `false` once closed.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(error) => {
                warn!(error = %error, "Failed to serialise outgoing message");
                return false;
            }
        };

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        sender.as_ref().is_some_and(|tx| tx.send(json).is_ok())
    }

    /// Queues a notification.
    pub fn notify(&self, method: &str, params: Option<Value>) {
        if !self.send(&OutgoingNotification::new(method, params)) {
            debug!(method, "Notification dropped, connection closed");
        }
    }

    /// Sends a request to the client and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Client`] if the client answered with an
    /// error and [`OutboundError::Closed`] if no answer can arrive anymore.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, OutboundError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending_requests().insert(id.clone(), tx);

        if !self.send(&OutgoingRequest::new(id.clone(), method, params)) {
            self.pending_requests().remove(&id);
            return Err(OutboundError::Closed);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(OutboundError::Client(error)),
            Err(_) => Err(OutboundError::Closed),
        }
    }

    /// Completes the request `reply` answers. Unknown IDs are ignored.
    pub fn resolve(&self, reply: JsonRpcReply) {
        let Some(slot) = self.pending_requests().remove(&reply.id) else {
            debug!(id = %reply.id, "Reply to unknown request ignored");
            return;
        };

        let outcome = match (reply.result, reply.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        };
        // The requester may have been cancelled in the meantime.
        let _ = slot.send(outcome);
    }

    /// Stops accepting messages and fails every pending request.
    ///
    /// Messages already queued are still written.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.pending_requests().clear();
    }

    fn pending_requests(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("pending", &self.pending_requests().len())
            .finish_non_exhaustive()
    }
}
