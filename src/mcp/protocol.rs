//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the core message types used in the Model Context Protocol.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Response**: A reply to a request (success or error)
//! - **Notification**: A one-way message (no `id`, no response expected)
//!
//! Because this server also issues its own requests to the client (sampling),
//! incoming messages may be responses to server-initiated requests. These are
//! distinguished by having an `id` and a `result`/`error` member but no `method`.
//!
//! # MCP-Specific Constraints
//!
//! - Request IDs must be strings or integers (never `null`)
//! - Request IDs must be unique within a session

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation and logging notifications.
pub const SERVER_NAME: &str = "mcp-testbed";

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A progress token supplied by the client with a tool invocation.
///
/// The token is opaque: it is cloned verbatim into every progress
/// notification emitted for that invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Numeric token.
    Number(i64),
    /// String token.
    String(String),
}

/// Role of a message in a sampling or prompt conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System framing message.
    System,
    /// Message authored by the user / client.
    User,
    /// Message authored by the model.
    Assistant,
}

/// A JSON-RPC 2.0 request message.
///
/// Requests expect a response from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != "2.0" {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }
}

/// A JSON-RPC 2.0 notification message (incoming).
///
/// Notifications do not have an ID and do not expect a response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A response to a server-initiated request (incoming).
///
/// Carries either `result` or `error`, correlated by `id` to a request
/// previously sent through the outbox (e.g. `sampling/createMessage`).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcIncomingResponse {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The ID of the server-initiated request this responds to.
    pub id: RequestId,

    /// The result value on success.
    #[serde(default)]
    pub result: Option<Value>,

    /// The error object on failure.
    #[serde(default)]
    pub error: Option<JsonRpcErrorData>,
}

/// An outgoing JSON-RPC 2.0 notification (server to client).
///
/// Used for resource-update, logging and progress notifications.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }

    /// Creates a progress notification for a progress-tracked invocation.
    #[must_use]
    pub fn progress(progress_token: &ProgressToken, progress: u64, total: u64) -> Self {
        let params = serde_json::json!({
            "progress": progress,
            "total": total,
            "progressToken": progress_token,
        });
        Self::new("notifications/progress", Some(params))
    }

    /// Creates a resource-updated notification for a subscribed URI.
    #[must_use]
    pub fn resource_updated(uri: &str) -> Self {
        let params = serde_json::json!({ "uri": uri });
        Self::new("notifications/resources/updated", Some(params))
    }

    /// Creates a logging message notification.
    #[must_use]
    pub fn logging_message(level: &str, logger: &str, data: impl Into<String>) -> Self {
        let params = serde_json::json!({
            "level": level,
            "logger": logger,
            "data": data.into(),
        });
        Self::new("notifications/message", Some(params))
    }
}

/// An outgoing JSON-RPC 2.0 request (server to client).
///
/// The sampling bridge uses this to forward generation requests to the
/// client's model backend.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRequest {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// Server-allocated request identifier.
    pub id: RequestId,

    /// The method to invoke on the client.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingRequest {
    /// Creates a new outgoing request.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes, plus MCP extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// The requested resource does not exist (MCP extension).
    ResourceNotFound,
    /// The request was cancelled before completion.
    RequestCancelled,
    /// Server-defined error.
    ServerError(i32),
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ResourceNotFound => -32002,
            Self::RequestCancelled => -32800,
            Self::ServerError(code) => code,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ResourceNotFound => "Resource not found",
            Self::RequestCancelled => "Request cancelled",
            Self::ServerError(_) => "Server error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error (e.g. a nested cause).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// An incoming message: a request, a notification, or a response to a
/// server-initiated request.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
    /// A response to a request this server sent to the client.
    Response(JsonRpcIncomingResponse),
}

impl IncomingMessage {
    /// Returns the method name of this message, if it has one.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) => None,
        }
    }

    /// Returns the request ID if this is a request or response.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(resp) => Some(&resp.id),
            Self::Notification(_) => None,
        }
    }
}

/// Parses a JSON string into an incoming message.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the JSON is malformed or not a valid message.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    // First, try to parse as generic JSON to check structure
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;

    // Check if it's an object
    let obj = value.as_object().ok_or_else(JsonRpcError::parse_error)?;

    // Check for jsonrpc field
    let jsonrpc = obj
        .get("jsonrpc")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_request(None))?;

    if jsonrpc != "2.0" {
        return Err(JsonRpcError::invalid_request(None));
    }

    // A message without a method is a response to a server-initiated request
    if !obj.contains_key("method") {
        if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
            let response: JsonRpcIncomingResponse =
                serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
            return Ok(IncomingMessage::Response(response));
        }
        return Err(JsonRpcError::invalid_request(None));
    }

    // Check if this is a request (has id) or notification (no id)
    if obj.contains_key("id") {
        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;

        if request.validate().is_some() {
            return Err(JsonRpcError::invalid_request(Some(request.id)));
        }

        Ok(IncomingMessage::Request(request))
    } else {
        let notification: JsonRpcNotification =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;

        Ok(IncomingMessage::Notification(notification))
    }
}
