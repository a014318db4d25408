//! Tool registry and tool handlers.
//!
//! Three tools are exposed: a synchronous echo, a sampling-backed community
//! summary, and a progress-tracked event listing. The registry (names,
//! descriptions, input schemas) is built once at startup and is read-only
//! afterwards; duplicate tool names are a programmer error caught at
//! construction.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::McpError;
use crate::mcp::protocol::{OutgoingNotification, ProgressToken, Role};
use crate::mcp::transport::Outbox;
use crate::sampling::{ContextInclusion, CreateMessageParams, SamplingBridge, SamplingMessage};

/// Default total duration of the simulated event retrieval, in seconds.
const DEFAULT_EVENTS_DURATION_SECS: u64 = 10;
/// Default number of progress steps.
const DEFAULT_EVENTS_STEPS: u64 = 5;
/// Default token budget for the community summary.
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 2000;

/// Degraded result returned when the event retrieval fails mid-sequence.
///
/// This tool deliberately never surfaces raw errors past its boundary.
const EVENTS_DEGRADED_RESULT: &str =
    "An error occurred while retrieving upcoming events. Please try again later.";

/// A tool definition for the tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Request metadata carried alongside tool call params.
#[derive(Debug, Clone, Deserialize)]
pub struct CallMeta {
    /// Correlator for progress notifications; absent means the client
    /// does not want progress updates.
    #[serde(default, rename = "progressToken")]
    pub progress_token: Option<ProgressToken>,
}

/// Parameters for a tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
    /// Request metadata (progress token).
    #[serde(default, rename = "_meta")]
    pub meta: Option<CallMeta>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// The static tool catalogue.
#[derive(Debug)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Builds the registry.
    ///
    /// # Panics
    ///
    /// Panics if two definitions share a name (programmer error, detected
    /// before the server accepts input).
    #[must_use]
    pub fn new() -> Self {
        let definitions = tool_definitions();

        let mut seen = std::collections::HashSet::new();
        for definition in &definitions {
            assert!(
                seen.insert(definition.name.clone()),
                "duplicate tool name: {}",
                definition.name
            );
        }

        Self { definitions }
    }

    /// Returns the tool definitions for tools/list.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Invokes a tool by name.
///
/// An unknown tool name yields a tool-level error result (`isError: true`),
/// not a protocol error.
///
/// # Errors
///
/// Returns [`McpError`] for invalid arguments, cancellation, or a sampling
/// backend failure (the progress-tracked tool excepted: it degrades to a
/// textual result instead).
pub async fn call(
    bridge: &SamplingBridge,
    outbox: &Outbox,
    params: ToolCallParams,
    cancel: &CancellationToken,
) -> Result<ToolCallResult, McpError> {
    let progress_token = params.meta.and_then(|meta| meta.progress_token);

    match params.name.as_str() {
        "echo" => echo(&params.arguments),
        "getCommunitySummary" => community_summary(bridge, &params.arguments, cancel).await,
        "getUpcomingEvents" => {
            upcoming_events(outbox, &params.arguments, progress_token, cancel).await
        }
        other => Ok(ToolCallResult::error(format!("Unknown tool: {other}"))),
    }
}

/// Echoes the message back to the client.
fn echo(arguments: &Value) -> Result<ToolCallResult, McpError> {
    let message = arguments
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid_params("Missing required argument 'message'"))?;

    Ok(ToolCallResult::text(format!("Echo: {message}")))
}

/// Generates a community summary through the sampling bridge.
async fn community_summary(
    bridge: &SamplingBridge,
    arguments: &Value,
    cancel: &CancellationToken,
) -> Result<ToolCallResult, McpError> {
    let default_prompt = "Provide a detailed summary of this developer community. \
         Include key information about its mission, activities, and how it engages \
         with developers. Additionally, summarize its most recent events, including \
         key topics, speakers, and any notable takeaways.";

    let prompt = arguments
        .get("prompt")
        .and_then(Value::as_str)
        .unwrap_or(default_prompt)
        .to_string();

    let max_tokens = arguments
        .get("maxTokens")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_SUMMARY_MAX_TOKENS);

    let params = CreateMessageParams {
        messages: vec![SamplingMessage::new(Role::User, prompt)],
        system_prompt: Some(
            "You are a helpful server with information about developer communities.".to_string(),
        ),
        max_tokens,
        temperature: Some(0.7),
        include_context: Some(ContextInclusion::ThisServer),
    };

    let text = bridge.request_sampling(params, cancel).await?;
    Ok(ToolCallResult::text(text))
}

/// Simulates retrieving upcoming community events with progress tracking.
///
/// Divides `duration` into `steps` cancellable sleeps, emitting one progress
/// notification per completed step when the call carried a progress token.
/// Cancellation mid-sequence stops further steps and notifications. Any
/// other failure degrades to [`EVENTS_DEGRADED_RESULT`] instead of an error.
async fn upcoming_events(
    outbox: &Outbox,
    arguments: &Value,
    progress_token: Option<ProgressToken>,
    cancel: &CancellationToken,
) -> Result<ToolCallResult, McpError> {
    let duration = arguments
        .get("duration")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_EVENTS_DURATION_SECS);
    let steps = arguments
        .get("steps")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_EVENTS_STEPS);

    if steps == 0 {
        return Err(McpError::invalid_params("'steps' must be at least 1"));
    }

    let step_duration = std::time::Duration::from_secs(duration / steps);

    tracing::debug!(duration, steps, "Fetching upcoming events");

    for step in 1..=steps {
        tokio::select! {
            () = cancel.cancelled() => return Err(McpError::Cancelled),
            () = tokio::time::sleep(step_duration) => {}
        }

        if let Some(token) = &progress_token {
            let notification = OutgoingNotification::progress(token, step, steps);
            if let Err(e) = outbox.send_notification(notification).await {
                tracing::warn!(error = %e, step, "Failed to send progress notification");
                return Ok(ToolCallResult::text(EVENTS_DEGRADED_RESULT));
            }
        }
    }

    let events = [
        "Hands-On Workshop: Protocol Servers in Practice (June 15, 2025)",
        "Hands-On Workshop: Building MCP Clients (September 20, 2025)",
        "Tool Calling & Structured Outputs (October 12, 2025)",
        "Expert Panel on Agent Architectures (November 20, 2025)",
        "Debugging & Performance Tuning for Model Backends (December 14, 2025)",
    ];

    let response = format!("Upcoming Community Events:\n{}", events.join("\n"));
    Ok(ToolCallResult::text(response))
}

/// Returns the list of available tools.
fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "echo".to_string(),
            description: Some("Echoes the message back to the client.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to be echoed back to the client"
                    }
                },
                "required": ["message"]
            }),
        },
        ToolDefinition {
            name: "getCommunitySummary".to_string(),
            description: Some(
                "Retrieves a summary of the developer community, including its mission \
                 and recent events, generated by the connected model backend."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The prompt to send to the model backend"
                    },
                    "maxTokens": {
                        "type": "integer",
                        "description": "Maximum number of tokens to generate (default: 2000)"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "getUpcomingEvents".to_string(),
            description: Some(
                "Simulates retrieving a list of upcoming community events with \
                 progress tracking."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "duration": {
                        "type": "integer",
                        "description": "Total duration of the operation in seconds (default: 10)"
                    },
                    "steps": {
                        "type": "integer",
                        "description": "Number of progress steps before completion (default: 5)"
                    }
                }
            }),
        },
    ]
}
