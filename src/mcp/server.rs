//! MCP server for MongoDB and MongoDB Atlas.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls, resource reads and subscriptions
//! 3. **Shutdown**: Graceful connection termination
//!
//! Requests other than `tools/call` are answered inline by the read loop.
//! Every tool call runs as its own task so that cancellations and replies to
//! `elicitation/create` can still be read while the tool is suspended.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::elicitation::ElicitationConfirmer;
use super::outbound::Outbound;
use super::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
    SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS,
};
use super::transport::{LineReader, LineWriter};
use crate::resources::{ResourceNotification, ResourceRegistry};
use crate::session::Session;
use crate::timeout::TimeoutManager;
use crate::tools::confirmation::Confirmer;
use crate::tools::registry::ToolRegistry;
use crate::tools::Tool;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolCapabilities { list_changed: true },
            resources: ResourceCapabilities {
                subscribe: true,
                list_changed: true,
            },
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapabilities {
    /// Tools are enabled and disabled as the connection changes.
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Clients may subscribe to resource updates.
    pub subscribe: bool,
    /// The resource list can change during the session.
    pub list_changed: bool,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ResourceParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelledParams {
    request_id: RequestId,
    #[serde(default)]
    reason: Option<String>,
}

/// Picks the protocol version for a client.
///
/// A supported version is echoed back; anything else gets the latest.
fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|version| **version == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    let params = req
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))?;
    serde_json::from_value(params).map_err(|e| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
    })
}

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// The MCP server.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    session: Arc<Session>,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    outbound: Arc<Outbound>,
    /// Taken by the writer task when serving starts.
    outbound_rx: Option<UnboundedReceiver<String>>,
    confirmer: Arc<ElicitationConfirmer>,
    /// Cancellation tokens of the tool calls still running.
    in_flight: InFlight,
    /// Disconnects from MongoDB after a period without requests.
    idle: Option<Arc<TimeoutManager>>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
}

impl McpServer {
    /// Creates a server for `session` exposing `tools`.
    #[must_use]
    pub fn new(session: Arc<Session>, tools: Vec<Arc<dyn Tool>>) -> Self {
        let (outbound, outbound_rx) = Outbound::new();
        let confirmer = Arc::new(ElicitationConfirmer::new(Arc::clone(&outbound)));

        let tools = ToolRegistry::new(
            Arc::clone(&session),
            tools,
            Arc::clone(&confirmer) as Arc<dyn Confirmer>,
        );
        let notifier = Arc::clone(&outbound);
        tools.set_list_changed(Arc::new(move || {
            notifier.notify("notifications/tools/list_changed", None);
        }));

        let resources = ResourceRegistry::new(&session);
        let notifier = Arc::clone(&outbound);
        resources.set_notifier(Arc::new(move |notification| match notification {
            ResourceNotification::Updated(uri) => {
                notifier.notify("notifications/resources/updated", Some(json!({ "uri": uri })));
            }
            ResourceNotification::ListChanged => {
                notifier.notify("notifications/resources/list_changed", None);
            }
        }));

        let in_flight = InFlight::default();
        let idle_timeout_ms = session.config().idle_timeout_ms;
        let idle = (idle_timeout_ms > 0).then(|| {
            let session = Arc::clone(&session);
            let in_flight = Arc::clone(&in_flight);
            Arc::new(TimeoutManager::new(
                Duration::from_millis(idle_timeout_ms),
                move || {
                    // A running call restarts the timer when it finishes.
                    if !in_flight
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .is_empty()
                    {
                        debug!("Idle timeout reached with tool calls in flight, staying connected");
                        return;
                    }
                    let session = Arc::clone(&session);
                    tokio::spawn(async move {
                        info!("Idle timeout reached, disconnecting from MongoDB");
                        session.disconnect().await;
                    });
                },
            ))
        });

        Self {
            state: ServerState::AwaitingInit,
            session,
            tools,
            resources,
            outbound,
            outbound_rx: Some(outbound_rx),
            confirmer,
            in_flight,
            idle,
            protocol_version: None,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the server over stdio until the input closes or a termination
    /// signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(unix)]
    pub async fn run(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let shutdown = async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            }
        };

        self.serve_until(tokio::io::stdin(), tokio::io::stdout(), shutdown)
            .await
    }

    /// Runs the server over stdio until the input closes or Ctrl+C is pressed.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(windows)]
    pub async fn run(&mut self) -> io::Result<()> {
        let shutdown = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
                Err(error) => {
                    warn!(error = %error, "Cannot listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        };

        self.serve_until(tokio::io::stdin(), tokio::io::stdout(), shutdown)
            .await
    }

    /// Serves one client over `reader` / `writer` until the input closes.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W>(&mut self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.serve_until(reader, writer, std::future::pending()).await
    }

    /// Serves one client until the input closes or `shutdown` completes.
    ///
    /// The session is closed afterwards and every queued message is written
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails or the server already served.
    pub async fn serve_until<R, W, F>(&mut self, reader: R, writer: W, shutdown: F) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let outbound_rx = self
            .outbound_rx
            .take()
            .ok_or_else(|| io::Error::other("server already served a client"))?;
        let writer = tokio::spawn(LineWriter::new(writer).drain(outbound_rx));

        let mut reader = LineReader::new(reader);
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                biased;

                () = &mut shutdown => break Ok(()),

                line = reader.read_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        self.handle_line(&line);
                        if self.state == ServerState::ShuttingDown {
                            break Ok(());
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        break Ok(());
                    }
                    Err(error) => break Err(error),
                },
            }
        };

        self.shutdown().await;

        match writer.await {
            Ok(written) => result.and(written),
            Err(error) => result.and(Err(io::Error::other(error))),
        }
    }

    async fn shutdown(&mut self) {
        self.state = ServerState::ShuttingDown;

        for (_, token) in self.in_flight().drain() {
            token.cancel();
        }
        if let Some(idle) = &self.idle {
            idle.clear();
        }

        self.session.close().await;
        self.outbound.close();
        info!("Server shut down");
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<RequestId, CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles a single line of input.
    fn handle_line(&mut self, line: &str) {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg),
            Err(error) => {
                self.outbound.send(&error);
            }
        }
    }

    /// Handles a parsed incoming message.
    fn handle_message(&mut self, msg: IncomingMessage) {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req),
            IncomingMessage::Notification(ref notif) => self.handle_notification(notif),
            IncomingMessage::Response(reply) => self.outbound.resolve(reply),
        }
    }

    /// Handles an incoming request.
    fn handle_request(&mut self, req: JsonRpcRequest) {
        if let Some(idle) = &self.idle {
            idle.reset();
        }

        if req.method == "tools/call" {
            self.handle_tools_call(req);
            return;
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "resources/list" => self.handle_resources_list(&req),
            "resources/templates/list" => self.handle_resource_templates_list(&req),
            "resources/read" => self.handle_resources_read(&req),
            "resources/subscribe" => self.handle_resources_subscribe(&req),
            "resources/unsubscribe" => self.handle_resources_unsubscribe(&req),
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.outbound.send(&resp),
            Err(error) => self.outbound.send(&error),
        };
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" if self.state == ServerState::Initialising => {
                self.state = ServerState::Running;
                info!("Client initialised");
            }
            "notifications/cancelled" => {
                let Some(params) = notif
                    .params
                    .clone()
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
                else {
                    warn!("Ignoring malformed cancellation");
                    return;
                };
                if let Some(token) = self.in_flight().remove(&params.request_id) {
                    debug!(id = %params.request_id, reason = ?params.reason, "Cancelling request");
                    token.cancel();
                }
            }
            method => debug!(method, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;

        let elicitation = params.capabilities.get("elicitation").is_some();
        self.confirmer.set_supported(elicitation);
        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = ?client.version, elicitation, "Client connected");
            self.session.connection().set_client_name(client.name.clone());
        }

        let negotiated_version = negotiate_version(&params.protocol_version).to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": self.tools.definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Starts a tool call. The response is sent by the call's task.
    fn handle_tools_call(&self, req: JsonRpcRequest) {
        let params = self
            .require_running(&req.id)
            .and_then(|()| parse_params::<ToolCallParams>(&req, "tool call"));
        let params = match params {
            Ok(params) => params,
            Err(error) => {
                self.outbound.send(&error);
                return;
            }
        };

        let id = req.id;
        let cancel = CancellationToken::new();
        self.in_flight().insert(id.clone(), cancel.clone());

        let tools = Arc::clone(&self.tools);
        let outbound = Arc::clone(&self.outbound);
        let in_flight = Arc::clone(&self.in_flight);
        let idle = self.idle.clone();
        tokio::spawn(async move {
            let outcome = tools
                .call(&params.name, params.arguments, cancel.clone())
                .await;
            let idle_now = {
                let mut in_flight = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                in_flight.remove(&id);
                in_flight.is_empty()
            };
            if let (true, Some(idle)) = (idle_now, idle) {
                idle.reset();
            }

            if cancel.is_cancelled() {
                debug!(id = %id, tool = %params.name, "Dropping response of cancelled request");
                return;
            }

            match outcome {
                Ok(result) => match serde_json::to_value(&result) {
                    Ok(value) => outbound.send(&JsonRpcResponse::success(id, value)),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialise tool call result");
                        outbound.send(&JsonRpcError::internal_error(
                            id,
                            "Internal error: failed to serialise result",
                        ))
                    }
                },
                Err(error) => outbound.send(&JsonRpcError::invalid_params(id, error.to_string())),
            };
        });
    }

    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": self.resources.list() }),
        ))
    }

    fn handle_resource_templates_list(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resourceTemplates": [] }),
        ))
    }

    fn handle_resources_read(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let ResourceParams { uri } = parse_params(req, "resource read")?;

        let contents = self.resources.read(&uri).ok_or_else(|| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Resource not found: {uri}"))
        })?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "contents": [contents] }),
        ))
    }

    fn handle_resources_subscribe(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let ResourceParams { uri } = parse_params(req, "subscribe")?;

        if !self.resources.subscribe(&uri) {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                format!("Resource not found: {uri}"),
            ));
        }
        debug!(uri, "Subscribed to resource");
        Ok(JsonRpcResponse::success(req.id.clone(), json!({})))
    }

    fn handle_resources_unsubscribe(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let ResourceParams { uri } = parse_params(req, "unsubscribe")?;

        self.resources.unsubscribe(&uri);
        Ok(JsonRpcResponse::success(req.id.clone(), json!({})))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("state", &self.state)
            .field("protocol_version", &self.protocol_version)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    use crate::config::Config;
    use crate::error::ToolError;
    use crate::testing::{test_session, MockConnector, MockProvider};
    use crate::tools::{all_tools, OperationKind, ToolCategory, ToolContext, ToolResult};

    struct Client {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        server: JoinHandle<io::Result<()>>,
    }

    impl Client {
        fn start(config: Config, connector: &Arc<MockConnector>) -> Self {
            Self::serve(McpServer::new(test_session(config, connector), all_tools()))
        }

        fn serve(mut mcp: McpServer) -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let (server_read, server_write) = tokio::io::split(server);
            let server = tokio::spawn(async move { mcp.serve(server_read, server_write).await });

            let (read, writer) = tokio::io::split(client);
            Self {
                lines: BufReader::new(read).lines(),
                writer,
                server,
            }
        }

        async fn send(&mut self, message: Value) {
            let line = format!("{message}\n");
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn request(&mut self, id: i64, method: &str, params: Value) -> Value {
            self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
                .await;
            loop {
                let message = self.recv().await;
                if message["id"] == id {
                    return message;
                }
            }
        }

        async fn initialise(&mut self, capabilities: Value) -> Value {
            let response = self
                .request(
                    0,
                    "initialize",
                    json!({
                        "protocolVersion": "2025-03-26",
                        "capabilities": capabilities,
                        "clientInfo": { "name": "test-client", "version": "1.0.0" }
                    }),
                )
                .await;
            self.send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
                .await;
            response
        }

        async fn close(mut self) {
            self.writer.shutdown().await.unwrap();
            self.server.await.unwrap().unwrap();
        }
    }

    #[test]
    fn server_initial_state() {
        let connector = Arc::new(MockConnector::new());
        let server = McpServer::new(test_session(Config::default(), &connector), all_tools());
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(server.protocol_version().is_none());
    }

    #[test]
    fn version_negotiation() {
        assert_eq!(negotiate_version("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_version("2025-06-18"), "2025-06-18");
        assert_eq!(negotiate_version("1999-01-01"), MCP_PROTOCOL_VERSION);
    }

    #[test]
    fn capabilities_serialise_camel_case() {
        let value = serde_json::to_value(ServerCapabilities::default()).unwrap();
        assert_eq!(value["tools"]["listChanged"], true);
        assert_eq!(value["resources"]["subscribe"], true);
        assert_eq!(value["resources"]["listChanged"], true);
    }

    #[tokio::test]
    async fn initialize_negotiates_and_requires_initialized() {
        let connector = Arc::new(MockConnector::new());
        let mut client = Client::start(Config::default(), &connector);

        let early = client.request(7, "tools/list", json!({})).await;
        assert_eq!(early["error"]["code"], -32600);

        let response = client.initialise(json!({})).await;
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);

        let again = client
            .request(1, "initialize", json!({ "protocolVersion": MCP_PROTOCOL_VERSION }))
            .await;
        assert_eq!(again["error"]["message"], "Server already initialised");

        let pong = client.request(2, "ping", json!({})).await;
        assert_eq!(pong["result"], json!({}));

        client.close().await;
    }

    #[tokio::test]
    async fn connecting_swaps_the_tool_list() {
        let connector = Arc::new(MockConnector::new());
        connector.prepare(Arc::new(MockProvider::new()));
        let mut client = Client::start(Config::default(), &connector);
        client.initialise(json!({})).await;

        let names = |response: &Value| -> Vec<String> {
            response["result"]["tools"]
                .as_array()
                .unwrap()
                .iter()
                .map(|tool| tool["name"].as_str().unwrap().to_string())
                .collect()
        };

        let before = client.request(1, "tools/list", json!({})).await;
        assert!(names(&before).contains(&"connect".to_string()));
        assert!(!names(&before).contains(&"switch-connection".to_string()));

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {
                    "name": "connect",
                    "arguments": { "connectionString": "mongodb://localhost:27017" }
                }
            }))
            .await;

        let mut saw_list_changed = false;
        loop {
            let message = client.recv().await;
            if message["method"] == "notifications/tools/list_changed" {
                saw_list_changed = true;
            }
            if message["id"] == 2 {
                assert!(message["result"]["isError"].is_null());
                break;
            }
        }
        assert!(saw_list_changed);

        let after = client.request(3, "tools/list", json!({})).await;
        assert!(!names(&after).contains(&"connect".to_string()));
        assert!(names(&after).contains(&"switch-connection".to_string()));

        client.close().await;
    }

    #[tokio::test]
    async fn unknown_tool_is_an_invalid_params_error() {
        let connector = Arc::new(MockConnector::new());
        let mut client = Client::start(Config::default(), &connector);
        client.initialise(json!({})).await;

        let response = client
            .request(1, "tools/call", json!({ "name": "no-such-tool", "arguments": {} }))
            .await;

        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["error"]["message"], "Tool no-such-tool not found");
        client.close().await;
    }

    #[tokio::test]
    async fn resources_can_be_read_and_subscribed() {
        let connector = Arc::new(MockConnector::new());
        let mut client = Client::start(Config::default(), &connector);
        client.initialise(json!({})).await;

        let list = client.request(1, "resources/list", json!({})).await;
        let uris: Vec<&str> = list["result"]["resources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["uri"].as_str().unwrap())
            .collect();
        assert_eq!(uris, ["config://config", "config://debug"]);

        let read = client
            .request(2, "resources/read", json!({ "uri": "config://debug" }))
            .await;
        assert_eq!(read["result"]["contents"][0]["uri"], "config://debug");

        let missing = client
            .request(3, "resources/read", json!({ "uri": "nope://x" }))
            .await;
        assert_eq!(missing["error"]["code"], -32602);

        let subscribed = client
            .request(4, "resources/subscribe", json!({ "uri": "config://debug" }))
            .await;
        assert_eq!(subscribed["result"], json!({}));

        client.close().await;
    }

    #[tokio::test]
    async fn malformed_input_gets_a_parse_error() {
        let connector = Arc::new(MockConnector::new());
        let mut client = Client::start(Config::default(), &connector);

        client
            .writer
            .write_all(b"this is not json\n")
            .await
            .unwrap();
        let response = client.recv().await;

        assert_eq!(response["error"]["code"], -32700);
        client.close().await;
    }

    /// Holds its MongoDB connection until released.
    struct Gated(Arc<tokio::sync::Notify>);

    #[async_trait::async_trait]
    impl Tool for Gated {
        fn name(&self) -> &'static str {
            "gated"
        }
        fn description(&self) -> &'static str {
            "waits for the test to release it"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::MongoDb
        }
        fn operation(&self) -> OperationKind {
            OperationKind::Read
        }
        async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<ToolResult, ToolError> {
            ctx.provider().await?;
            self.0.notified().await;
            Ok(ToolResult::text("released"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_waits_for_running_calls() {
        let connector = Arc::new(MockConnector::new());
        let config = Config {
            connection_string: Some("mongodb://configured".into()),
            idle_timeout_ms: 50,
            ..Config::default()
        };
        let session = test_session(config, &connector);
        let gate = Arc::new(tokio::sync::Notify::new());
        let mcp = McpServer::new(Arc::clone(&session), vec![Arc::new(Gated(Arc::clone(&gate)))]);
        let mut client = Client::serve(mcp);
        client.initialise(json!({})).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": "gated", "arguments": {} }
            }))
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(session.connection().current_state().is_connected());

        gate.notify_one();
        let response = loop {
            let message = client.recv().await;
            if message["id"] == 1 {
                break message;
            }
        };
        assert_eq!(response["result"]["content"][0]["text"], "released");
        assert!(session.connection().current_state().is_connected());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.connection().current_state().tag(), "disconnected");

        client.close().await;
    }
}
