//! Tool registration, enablement and the call pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use indexmap::IndexMap;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::confirmation::{Confirmation, Confirmer};
use super::{Tool, ToolContext, ToolError, ToolResult};
use crate::config::Config;
use crate::session::{Session, SessionEvent};

/// Why a call never reached a tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No tool with that name is registered.
    #[error("Tool {0} not found")]
    UnknownTool(String),

    /// The tool is registered but currently disabled.
    #[error("Tool {0} disabled")]
    Disabled(String),
}

/// Hints describing a tool's behaviour.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Display title.
    pub title: String,
    /// The tool does not modify anything.
    pub read_only_hint: bool,
    /// The tool may remove data.
    pub destructive_hint: bool,
}

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// JSON Schema of the structured content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Behaviour hints.
    pub annotations: ToolAnnotations,
}

struct Entry {
    tool: Arc<dyn Tool>,
    validator: Validator,
    enabled: AtomicBool,
}

type ListChanged = Arc<dyn Fn() + Send + Sync>;

/// The registered tools of a server.
///
/// Tools are registered once, in declaration order, and never removed.
/// Their enablement follows the connection: on `connected` tools enabled
/// only while disconnected are disabled and vice versa.
pub struct ToolRegistry {
    session: Arc<Session>,
    confirmer: Arc<dyn Confirmer>,
    tools: IndexMap<&'static str, Entry>,
    list_changed: Mutex<Option<ListChanged>>,
}

impl ToolRegistry {
    /// Registers every tool of `tools` that the configuration allows and the
    /// session can serve.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        tools: Vec<Arc<dyn Tool>>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Arc<Self> {
        let connected = session.connection().current_state().is_connected();
        let mut registered = IndexMap::new();

        for tool in tools {
            if let Some(reason) = excluded_by_config(session.config(), tool.as_ref()) {
                debug!(tool = tool.name(), "Prevented registration because {reason} is disabled in the config");
                continue;
            }
            if !tool.is_available(&session) {
                debug!(tool = tool.name(), category = tool.category().as_str(), "Tool unavailable in this session");
                continue;
            }
            let validator = match jsonschema::validator_for(&tool.input_schema()) {
                Ok(validator) => validator,
                Err(error) => {
                    warn!(tool = tool.name(), error = %error, "Invalid input schema, tool not registered");
                    continue;
                }
            };
            let enabled = AtomicBool::new(tool.enablement().allows(connected));
            registered.insert(
                tool.name(),
                Entry {
                    tool,
                    validator,
                    enabled,
                },
            );
        }
        info!(count = registered.len(), "Tools registered");

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            session.events().on_any(move |event: &SessionEvent| {
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                match event {
                    SessionEvent::Connected => registry.refresh(true),
                    SessionEvent::Disconnect
                    | SessionEvent::Close
                    | SessionEvent::ConnectionError(_) => registry.refresh(false),
                }
            });

            Self {
                session,
                confirmer,
                tools: registered,
                list_changed: Mutex::new(None),
            }
        })
    }

    /// Runs `notify` whenever the set of enabled tools changes.
    pub fn set_list_changed(&self, notify: ListChanged) {
        *self
            .list_changed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(notify);
    }

    /// Names of all registered tools, enabled or not.
    #[must_use]
    pub fn registered(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Returns `true` if `name` is registered and enabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .is_some_and(|entry| entry.enabled.load(Ordering::SeqCst))
    }

    /// Definitions of the enabled tools, in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|entry| entry.enabled.load(Ordering::SeqCst))
            .map(|entry| {
                let tool = &entry.tool;
                ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    input_schema: tool.input_schema(),
                    output_schema: tool.output_schema(),
                    annotations: ToolAnnotations {
                        title: tool.name().to_string(),
                        read_only_hint: matches!(
                            tool.operation(),
                            super::OperationKind::Metadata | super::OperationKind::Read
                        ),
                        destructive_hint: tool.operation() == super::OperationKind::Delete,
                    },
                }
            })
            .collect()
    }

    /// Runs a tool call through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the tool is unknown or disabled. Every
    /// other failure is reported inside the [`ToolResult`].
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, DispatchError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        if !entry.enabled.load(Ordering::SeqCst) {
            return Err(DispatchError::Disabled(name.to_string()));
        }

        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };

        let errors: Vec<String> = entry
            .validator
            .iter_errors(&arguments)
            .map(|error| error.to_string())
            .collect();
        if !errors.is_empty() {
            debug!(tool = name, "Rejected invalid arguments");
            return Ok(ToolResult::error(
                ToolError::InvalidArguments(format!(
                    "Invalid arguments for tool {name}: {}",
                    errors.join("; ")
                ))
                .to_string(),
            ));
        }

        let tool = Arc::clone(&entry.tool);

        if self.session.config().requires_confirmation(name) {
            let message = tool.confirmation_message(&arguments);
            match self.confirmer.confirm(name, &message).await {
                Confirmation::Granted => {}
                Confirmation::Denied => {
                    debug!(tool = name, "User did not confirm the tool execution");
                    return Ok(ToolResult::text(format!(
                        "User did not confirm the execution of the `{name}` tool so the operation was not performed."
                    )));
                }
                Confirmation::Unavailable => {
                    debug!(tool = name, "Confirmation required but the client cannot ask the user");
                    return Ok(ToolResult::text(format!(
                        "{message}\n\nThe client does not support asking for confirmation, so the `{name}` tool was not executed. Ask the user to confirm and to run it from a client that supports elicitation."
                    ))
                    .with_structured(json!({
                        "confirmationRequired": true,
                        "tool": name,
                        "message": message,
                    })));
                }
            }
        }

        debug!(tool = name, "Executing tool");
        let ctx = ToolContext {
            session: Arc::clone(&self.session),
            cancel: cancel.clone(),
        };
        let outcome = tokio::select! {
            biased;
            outcome = tool.execute(&ctx, arguments.clone()) => outcome,
            () = cancel.cancelled() => Err(ToolError::Connection("The operation was cancelled.".to_string())),
        };

        Ok(match outcome {
            Ok(result) => {
                debug!(tool = name, is_error = result.is_error, "Executed tool");
                result
            }
            Err(error) => {
                warn!(tool = name, error = %error, "Error executing tool");
                tool.handle_error(error, &arguments)
            }
        })
    }

    fn refresh(&self, connected: bool) {
        let mut changed = false;
        for (name, entry) in &self.tools {
            let enabled = entry.tool.enablement().allows(connected);
            if entry.enabled.swap(enabled, Ordering::SeqCst) != enabled {
                debug!(tool = *name, enabled, "Tool enablement changed");
                changed = true;
            }
        }

        if changed {
            let notify = self
                .list_changed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(notify) = notify {
                notify();
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.registered())
            .finish_non_exhaustive()
    }
}

/// Returns what excludes `tool`, phrased for the log, or `None`.
fn excluded_by_config(config: &Config, tool: &dyn Tool) -> Option<String> {
    let operation = tool.operation().as_str();
    let category = tool.category().as_str();
    let disabled = |entry: &str| config.disabled_tools.iter().any(|d| d == entry);

    if config.read_only && !tool.operation().is_read_only() {
        Some(format!("read-only mode is enabled, its operation type, `{operation}`,"))
    } else if disabled(category) {
        Some(format!("its category, `{category}`,"))
    } else if disabled(operation) {
        Some(format!("its operation type, `{operation}`,"))
    } else if disabled(tool.name()) {
        Some("it".to_string())
    } else {
        None
    }
}
