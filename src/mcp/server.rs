//! MCP server implementation.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Dispatching requests to registered handlers
//! 3. **Shutdown**: Graceful connection termination
//!
//! # Architecture
//!
//! The read loop owns stdin and parses one message per line. Requests are
//! dispatched through an explicit method table and run on their own tasks,
//! each with a cancellation token scoped to that request; responses to
//! server-initiated sampling requests are routed back to the bridge's
//! pending map. All outbound traffic goes through the shared [`Outbox`],
//! so a handler's confirmation notification is always written before that
//! handler's response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompleteParams, CompletionIndex};
use crate::config::SchedulerConfig;
use crate::error::McpError;
use crate::mcp::dispatch::{Dispatcher, HandlerFuture};
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcIncomingResponse, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    OutgoingNotification, RequestId, Role, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::{run_stdout_writer, Outbox, OutboundMessage, StdioTransport};
use crate::prompts::PromptRegistry;
use crate::resources::ResourceCatalog;
use crate::sampling::{CreateMessageParams, SamplingBridge, SamplingMessage};
use crate::scheduler::{spawn_logging_scheduler, spawn_resource_update_scheduler};
use crate::state::{LogLevel, ServerState};
use crate::tools::{self, ToolCallParams, ToolRegistry};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
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
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
    /// Prompt-related capabilities.
    pub prompts: PromptCapabilities,
    /// Argument completion support.
    pub completions: CompletionCapabilities,
    /// Logging-level control support.
    pub logging: LoggingCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceCapabilities {
    /// Whether resource subscriptions are supported.
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

impl Default for ResourceCapabilities {
    fn default() -> Self {
        Self {
            subscribe: true,
            list_changed: false,
        }
    }
}

/// Prompt-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptCapabilities {}

/// Completion capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionCapabilities {}

/// Logging capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoggingCapabilities {}

// serde's skip_serializing_if needs fn(&bool) -> bool
#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
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

/// Everything a request handler needs, owned in one place and shared behind
/// an `Arc`. The registries are read-only after construction; the mutable
/// pieces live in [`ServerState`] behind their own locks.
#[derive(Debug)]
pub struct ServerContext {
    /// Subscription set and logging level.
    pub state: Arc<ServerState>,
    /// Static resource catalogue.
    pub catalog: ResourceCatalog,
    /// Static completion index.
    pub completions: CompletionIndex,
    /// Static tool registry.
    pub tools: ToolRegistry,
    /// Static prompt registry.
    pub prompts: PromptRegistry,
    /// Bridge to the client's model backend.
    pub bridge: SamplingBridge,
    /// Outbound message queue.
    pub outbox: Outbox,
}

impl ServerContext {
    /// Builds the context with fresh state and all static registries.
    #[must_use]
    pub fn new(outbox: Outbox) -> Self {
        Self {
            state: Arc::new(ServerState::new()),
            catalog: ResourceCatalog::new(),
            completions: CompletionIndex::new(),
            tools: ToolRegistry::new(),
            prompts: PromptRegistry::new(),
            bridge: SamplingBridge::new(outbox.clone()),
            outbox,
        }
    }
}

/// Builds the method dispatch table.
///
/// # Panics
///
/// Panics if a method is registered twice (programmer error, caught at
/// startup).
#[must_use]
pub fn build_dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register("resources/list", list_resources);
    dispatcher.register("resources/templates/list", list_resource_templates);
    dispatcher.register("resources/read", read_resource);
    dispatcher.register("resources/subscribe", subscribe_resource);
    dispatcher.register("resources/unsubscribe", unsubscribe_resource);
    dispatcher.register("completion/complete", complete);
    dispatcher.register("logging/setLevel", set_logging_level);
    dispatcher.register("tools/list", list_tools);
    dispatcher.register("tools/call", call_tool);
    dispatcher.register("prompts/list", list_prompts);
    dispatcher.register("prompts/get", get_prompt);
    dispatcher
}

// =============================================================================
// Request handlers
// =============================================================================

/// Deserialises request params, treating absent params as invalid.
fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, McpError> {
    let value = params.ok_or_else(|| McpError::invalid_params("Missing request params"))?;
    serde_json::from_value(value)
        .map_err(|e| McpError::invalid_params(format!("Invalid request params: {e}")))
}

/// Params carrying a single resource URI.
#[derive(Debug, Deserialize)]
struct UriParams {
    uri: String,
}

fn list_resources(
    ctx: Arc<ServerContext>,
    _params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move { Ok(json!({ "resources": ctx.catalog.list() })) })
}

fn list_resource_templates(
    ctx: Arc<ServerContext>,
    _params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move { Ok(json!({ "resourceTemplates": ctx.catalog.templates() })) })
}

fn read_resource(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let params: UriParams = parse_params(params)?;
        let result = ctx.catalog.read(&params.uri)?;
        serde_json::to_value(result)
            .map_err(|e| McpError::invalid_params(format!("Failed to serialise contents: {e}")))
    })
}

/// Subscribes to resource updates and acknowledges through the sampling
/// bridge, synchronously within the request.
///
/// The acknowledgment text is discarded, but a bridge failure surfaces as
/// this request's error. The subscription itself is kept either way: the
/// registry write and the acknowledgment are not transactional.
fn subscribe_resource(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let params: UriParams = parse_params(params)?;
        ctx.state.subscriptions.subscribe(params.uri.clone());

        tracing::debug!(uri = %params.uri, "Resource subscribed");

        let ack = CreateMessageParams {
            messages: vec![
                SamplingMessage::new(Role::System, "You are a helpful test server"),
                SamplingMessage::new(
                    Role::User,
                    format!(
                        "Resource {}, context: A new subscription was started",
                        params.uri
                    ),
                ),
            ],
            system_prompt: None,
            max_tokens: 100,
            temperature: Some(0.7),
            include_context: None,
        };
        ctx.bridge.request_sampling(ack, &cancel).await?;

        Ok(json!({}))
    })
}

fn unsubscribe_resource(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let params: UriParams = parse_params(params)?;
        // Removing a URI that was never subscribed is a no-op, not an error
        ctx.state.subscriptions.unsubscribe(&params.uri);
        Ok(json!({}))
    })
}

fn complete(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let params: CompleteParams = parse_params(params)?;
        let completion = ctx.completions.complete(&params)?;
        Ok(json!({ "completion": completion }))
    })
}

/// Replaces the process-wide logging level and emits an immediate
/// confirmation notification before the response is written.
fn set_logging_level(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let level_value = params
            .as_ref()
            .and_then(|p| p.get("level"))
            .cloned()
            .ok_or_else(|| McpError::invalid_params("Missing required argument 'level'"))?;

        let level: LogLevel = serde_json::from_value(level_value)
            .map_err(|e| McpError::invalid_params(format!("Invalid logging level: {e}")))?;

        ctx.state.log_level.set(level);

        // Confirmation goes through the same FIFO outbox as the response,
        // so the client observes it first
        ctx.outbox
            .send_notification(OutgoingNotification::logging_message(
                "debug",
                SERVER_NAME,
                format!("Logging level set to {level}"),
            ))
            .await?;

        Ok(json!({}))
    })
}

fn list_tools(
    ctx: Arc<ServerContext>,
    _params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move { Ok(json!({ "tools": ctx.tools.definitions() })) })
}

fn call_tool(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let params: ToolCallParams = parse_params(params)?;
        let result = tools::call(&ctx.bridge, &ctx.outbox, params, &cancel).await?;
        serde_json::to_value(result)
            .map_err(|e| McpError::invalid_params(format!("Failed to serialise result: {e}")))
    })
}

fn list_prompts(
    ctx: Arc<ServerContext>,
    _params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move { Ok(json!({ "prompts": ctx.prompts.definitions() })) })
}

/// Params for prompts/get.
#[derive(Debug, Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn get_prompt(
    ctx: Arc<ServerContext>,
    params: Option<Value>,
    _cancel: CancellationToken,
) -> HandlerFuture {
    Box::pin(async move {
        let params: GetPromptParams = parse_params(params)?;
        let result = ctx.prompts.get(&params.name, &params.arguments)?;
        serde_json::to_value(result)
            .map_err(|e| McpError::invalid_params(format!("Failed to serialise prompt: {e}")))
    })
}

// =============================================================================
// Server
// =============================================================================

type InFlightMap = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// The MCP test server.
pub struct McpServer {
    /// Current lifecycle state.
    lifecycle: LifecycleState,
    /// The transport reader.
    transport: StdioTransport,
    /// Shared handler context.
    ctx: Arc<ServerContext>,
    /// Method dispatch table.
    dispatcher: Arc<Dispatcher>,
    /// Server-lifetime shutdown signal.
    shutdown: CancellationToken,
    /// Cancellation tokens of requests still being handled.
    in_flight: InFlightMap,
    /// Receiver half of the outbox, consumed by `run`.
    writer_rx: Option<mpsc::Receiver<OutboundMessage>>,
    /// Scheduler periods.
    scheduler: SchedulerConfig,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
}

impl McpServer {
    /// Creates a new MCP server with the given scheduler configuration.
    #[must_use]
    pub fn new(scheduler: SchedulerConfig) -> Self {
        let (outbox, writer_rx) = Outbox::channel();
        Self {
            lifecycle: LifecycleState::AwaitingInit,
            transport: StdioTransport::new(),
            ctx: Arc::new(ServerContext::new(outbox)),
            dispatcher: Arc::new(build_dispatcher()),
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            writer_rx: Some(writer_rx),
            scheduler,
            protocol_version: None,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Returns the negotiated protocol version, if initialisation happened.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// Spawns the stdout writer and both notification schedulers, then reads
    /// messages until stdin closes or a termination signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        if let Some(writer_rx) = self.writer_rx.take() {
            tokio::spawn(run_stdout_writer(writer_rx));
        }

        spawn_resource_update_scheduler(
            Arc::clone(&self.ctx.state),
            self.ctx.outbox.clone(),
            Duration::from_secs(self.scheduler.resource_update_interval_secs),
            self.shutdown.clone(),
        );
        spawn_logging_scheduler(
            Arc::clone(&self.ctx.state),
            self.ctx.outbox.clone(),
            Duration::from_secs(self.scheduler.logging_interval_secs),
            self.shutdown.clone(),
        );

        let result = self.run_with_shutdown().await;

        // Stops schedulers and any in-flight handlers
        self.shutdown.cancel();
        result
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.lifecycle = LifecycleState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.lifecycle = LifecycleState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.lifecycle = LifecycleState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("Client disconnected (EOF)");
            self.lifecycle = LifecycleState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await;

        Ok(self.lifecycle == LifecycleState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => {
                if let Err(e) = self.ctx.outbox.send_error(error).await {
                    tracing::warn!(error = %e, "Failed to report parse error");
                }
            }
        }
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(notif) => self.handle_notification(&notif),
            IncomingMessage::Response(resp) => self.handle_response(resp),
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) {
        let response = match req.method.as_str() {
            "initialize" => Some(self.handle_initialize(&req)),
            "ping" => Some(Ok(JsonRpcResponse::success(req.id.clone(), json!({})))),
            _ => {
                self.dispatch_request(req).await;
                None
            }
        };

        if let Some(response) = response {
            let result = match response {
                Ok(resp) => self.ctx.outbox.send_response(resp).await,
                Err(error) => self.ctx.outbox.send_error(error).await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to queue response");
            }
        }
    }

    /// Dispatches a request to its registered handler on a fresh task.
    async fn dispatch_request(&self, req: JsonRpcRequest) {
        if self.lifecycle != LifecycleState::Running {
            let error = JsonRpcError::new(
                Some(req.id),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server not initialised",
                ),
            );
            if let Err(e) = self.ctx.outbox.send_error(error).await {
                tracing::warn!(error = %e, "Failed to queue error response");
            }
            return;
        }

        let handler = match self.dispatcher.dispatch(&req.method) {
            Ok(handler) => handler,
            Err(error) => {
                tracing::debug!(method = %req.method, "Unsupported method");
                if let Err(e) = self.ctx.outbox.send_error(error.to_rpc_error(req.id)).await {
                    tracing::warn!(error = %e, "Failed to queue error response");
                }
                return;
            }
        };

        let cancel = self.shutdown.child_token();
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .insert(req.id.clone(), cancel.clone());

        let ctx = Arc::clone(&self.ctx);
        let in_flight = Arc::clone(&self.in_flight);
        let outbox = ctx.outbox.clone();
        let JsonRpcRequest {
            id, method, params, ..
        } = req;

        tokio::spawn(async move {
            let outcome = handler(ctx, params, cancel).await;

            in_flight
                .lock()
                .expect("in-flight lock poisoned")
                .remove(&id);

            let send_result = match outcome {
                Ok(result) => {
                    outbox
                        .send_response(JsonRpcResponse::success(id, result))
                        .await
                }
                Err(McpError::Cancelled) => {
                    // A cancelled request gets no response
                    tracing::debug!(%method, "Request cancelled");
                    return;
                }
                Err(error) => {
                    tracing::debug!(%method, error = %error, "Request failed");
                    outbox.send_error(error.to_rpc_error(id)).await
                }
            };

            if let Err(e) = send_result {
                tracing::warn!(error = %e, %method, "Failed to queue response");
            }
        });
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" if self.lifecycle == LifecycleState::Initialising => {
                tracing::info!("Client initialised, entering normal operation");
                self.lifecycle = LifecycleState::Running;
            }
            "notifications/cancelled" => self.handle_cancelled(notif.params.as_ref()),
            other => {
                tracing::debug!(method = %other, "Ignoring notification");
            }
        }
    }

    /// Cancels the in-flight request named by a cancellation notification.
    fn handle_cancelled(&self, params: Option<&Value>) {
        let Some(id) = params
            .and_then(|p| p.get("requestId"))
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
        else {
            return;
        };

        let token = self
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&id);

        if let Some(token) = token {
            tracing::debug!(request_id = %id, "Cancelling in-flight request");
            token.cancel();
        }
    }

    /// Routes a response to the sampling bridge's pending map.
    fn handle_response(&self, resp: JsonRpcIncomingResponse) {
        let outcome = match resp.error {
            Some(error) => Err(error),
            None => Ok(resp.result.unwrap_or(Value::Null)),
        };

        if !self.ctx.bridge.resolve(&resp.id, outcome) {
            tracing::debug!(id = %resp.id, "Response with no pending request");
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.lifecycle != LifecycleState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        tracing::info!(
            requested_version = %params.protocol_version,
            client = params
                .client_info
                .as_ref()
                .map_or("unknown", |c| c.name.as_str()),
            "Client connected"
        );

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.lifecycle = LifecycleState::Initialising;

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }
}
