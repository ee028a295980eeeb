//! Confirmation through `elicitation/create`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::outbound::Outbound;
use crate::tools::confirmation::{Confirmation, Confirmer};

/// Asks the user through the client, when the client supports elicitation.
#[derive(Debug)]
pub struct ElicitationConfirmer {
    outbound: Arc<Outbound>,
    supported: AtomicBool,
}

impl ElicitationConfirmer {
    /// Creates a confirmer. Elicitation is off until the client advertises it.
    #[must_use]
    pub const fn new(outbound: Arc<Outbound>) -> Self {
        Self {
            outbound,
            supported: AtomicBool::new(false),
        }
    }

    /// Records whether the client declared the `elicitation` capability.
    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    /// Whether the client declared the `elicitation` capability.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }
}

fn requested_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "confirmation": {
                "type": "string",
                "title": "Would you like to confirm?",
                "description": "Would you like to confirm?",
                "enum": ["Yes", "No"],
                "enumNames": ["Yes, I confirm", "No, I do not confirm"]
            }
        },
        "required": ["confirmation"]
    })
}

/// Only an accepted form answering "Yes" counts as consent.
fn is_confirmed(result: &Value) -> bool {
    result.get("action").and_then(Value::as_str) == Some("accept")
        && result
            .pointer("/content/confirmation")
            .and_then(Value::as_str)
            == Some("Yes")
}

#[async_trait]
impl Confirmer for ElicitationConfirmer {
    async fn confirm(&self, tool: &str, message: &str) -> Confirmation {
        if !self.is_supported() {
            return Confirmation::Unavailable;
        }

        let params = json!({
            "message": message,
            "requestedSchema": requested_schema(),
        });
        match self.outbound.request("elicitation/create", Some(params)).await {
            Ok(result) if is_confirmed(&result) => {
                debug!(tool, "User confirmed the tool execution");
                Confirmation::Granted
            }
            Ok(_) => Confirmation::Denied,
            Err(error) => {
                warn!(tool, error = %error, "Elicitation failed");
                Confirmation::Denied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::mcp::protocol::{JsonRpcReply, RequestId};

    #[test]
    fn only_accepted_yes_confirms() {
        assert!(is_confirmed(&json!({ "action": "accept", "content": { "confirmation": "Yes" } })));
        assert!(!is_confirmed(&json!({ "action": "accept", "content": { "confirmation": "No" } })));
        assert!(!is_confirmed(&json!({ "action": "decline" })));
        assert!(!is_confirmed(&json!({ "action": "cancel", "content": { "confirmation": "Yes" } })));
        assert!(!is_confirmed(&json!({})));
    }

    #[tokio::test]
    async fn unsupported_client_is_never_asked() {
        let (outbound, mut rx) = Outbound::new();
        let confirmer = ElicitationConfirmer::new(outbound);

        let answer = confirmer.confirm("drop-database", "sure?").await;

        assert_eq!(answer, Confirmation::Unavailable);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accepted_elicitation_grants() {
        let (outbound, mut rx) = Outbound::new();
        let confirmer = Arc::new(ElicitationConfirmer::new(Arc::clone(&outbound)));
        confirmer.set_supported(true);

        let asking = Arc::clone(&confirmer);
        let answer = tokio::spawn(async move { asking.confirm("drop-database", "sure?").await });

        let request: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(request["method"], "elicitation/create");
        assert_eq!(request["params"]["message"], "sure?");
        assert_eq!(
            request["params"]["requestedSchema"]["properties"]["confirmation"]["enum"],
            json!(["Yes", "No"])
        );

        outbound.resolve(JsonRpcReply {
            id: RequestId::Number(1),
            result: Some(json!({ "action": "accept", "content": { "confirmation": "Yes" } })),
            error: None,
        });

        assert_eq!(answer.await.unwrap(), Confirmation::Granted);
    }
}
