//! Connection tools.
//!
//! `connect` is offered while disconnected and `switch-connection` while
//! connected; the registry swaps them on every connection change.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::connection::{AuthType, ConnectionSettings, ConnectionState};
use crate::error::ToolError;
use crate::tools::{
    parse_args, Enablement, OperationKind, Tool, ToolCategory, ToolContext, ToolResult,
};

const CONNECTED: &str = "Successfully connected to MongoDB.";

fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "connected": { "type": "boolean" },
            "authType": { "type": "string" },
            "usedConfigConnectionString": { "type": "boolean" }
        },
        "required": ["connected", "usedConfigConnectionString"]
    })
}

/// Connects with `connection_string`, or the configured one when absent.
async fn connect_with(
    ctx: &ToolContext,
    connection_string: Option<String>,
) -> Result<ToolResult, ToolError> {
    let used_config = connection_string.is_none();
    let Some(connection_string) =
        connection_string.or_else(|| ctx.config().connection_string.clone())
    else {
        return Err(ToolError::InvalidArguments(
            "No connection string was provided and none is configured.".to_string(),
        ));
    };

    match ctx.session.connect(ConnectionSettings::new(connection_string)).await {
        ConnectionState::Connected { auth_type, .. } => Ok(ToolResult::text(CONNECTED)
            .with_structured(json!({
                "connected": true,
                "authType": auth_type.map(AuthType::as_str),
                "usedConfigConnectionString": used_config,
            }))),
        ConnectionState::Errored { reason } => Err(ToolError::Connection(format!(
            "Failed to connect to MongoDB: {reason}"
        ))),
        // Superseded, or an OIDC login is pending.
        _ => ctx.session.ensure_connected().await.map(|_| {
            ToolResult::text(CONNECTED).with_structured(json!({
                "connected": true,
                "usedConfigConnectionString": used_config,
            }))
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectArgs {
    connection_string: String,
}

/// `connect`: opens the first connection of the session.
#[derive(Debug, Clone, Copy)]
pub struct Connect;

#[async_trait]
impl Tool for Connect {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn description(&self) -> &'static str {
        "Connect to a MongoDB instance. The config resource captures if the server is already \
         connected to a MongoDB cluster. If the user has configured a connection string or has \
         previously called the connect tool, a connection is already established and there's no \
         need to call this tool unless the user has explicitly requested to switch to a new \
         MongoDB cluster."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "connectionString": {
                    "type": "string",
                    "description": "MongoDB connection string (in the mongodb:// or mongodb+srv:// format)"
                }
            },
            "required": ["connectionString"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(output_schema())
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Connect
    }

    fn enablement(&self) -> Enablement {
        Enablement::WhileDisconnected
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: ConnectArgs = parse_args(args)?;
        connect_with(ctx, Some(args.connection_string)).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchArgs {
    connection_string: Option<String>,
}

/// `switch-connection`: replaces the current connection.
#[derive(Debug, Clone, Copy)]
pub struct SwitchConnection;

#[async_trait]
impl Tool for SwitchConnection {
    fn name(&self) -> &'static str {
        "switch-connection"
    }

    fn description(&self) -> &'static str {
        "Switch to a different MongoDB connection. If the user has configured a connection \
         string or has previously called the connect tool, a connection is already established \
         and there's no need to call this tool unless the user has explicitly requested to \
         switch to a new instance."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "connectionString": {
                    "type": "string",
                    "description": "MongoDB connection string to switch to (in the mongodb:// or mongodb+srv:// format). If a connection string is not provided, the connection string from the config will be used."
                }
            }
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(output_schema())
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Connect
    }

    fn enablement(&self) -> Enablement {
        Enablement::WhileConnected
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: SwitchArgs = parse_args(args)?;
        connect_with(ctx, args.connection_string).await
    }
}
