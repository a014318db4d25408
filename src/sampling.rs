//! Sampling bridge: forwards generation requests to the client's model
//! backend and awaits the correlated response.
//!
//! The server allocates its own request IDs (`srv-N`, so they can never
//! collide with client-chosen IDs) and parks a oneshot sender in a pending
//! map. The read loop routes incoming responses back through
//! [`SamplingBridge::resolve`]. A caller's cancellation token unblocks the
//! wait promptly; a cancelled request is never retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeCause, McpError};
use crate::mcp::protocol::{JsonRpcErrorData, OutgoingRequest, RequestId, Role};
use crate::mcp::transport::Outbox;

/// Which context the client should include when generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextInclusion {
    /// No additional context.
    None,
    /// Context from this server only.
    ThisServer,
    /// Context from all connected servers.
    AllServers,
}

/// Text content of a sampling message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageContent {
    /// Content type; always "text" for this server.
    #[serde(rename = "type")]
    pub content_type: &'static str,
    /// The text.
    pub text: String,
}

impl MessageContent {
    /// Creates text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text",
            text: text.into(),
        }
    }
}

/// A role-tagged message in a generation request.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingMessage {
    /// Who authored the message.
    pub role: Role,
    /// The message content.
    pub content: MessageContent,
}

impl SamplingMessage {
    /// Creates a message with the given role and text.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::text(text),
        }
    }
}

/// Parameters of a `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// Ordered conversation messages.
    pub messages: Vec<SamplingMessage>,
    /// System prompt framing the generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Context inclusion policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_context: Option<ContextInclusion>,
}

type PendingSender = oneshot::Sender<Result<Value, JsonRpcErrorData>>;

/// Forwards generation requests through the outbox and correlates responses.
#[derive(Debug)]
pub struct SamplingBridge {
    outbox: Outbox,
    pending: Mutex<HashMap<RequestId, PendingSender>>,
    next_id: AtomicU64,
}

impl SamplingBridge {
    /// Creates a bridge sending through the given outbox.
    #[must_use]
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Routes an incoming response to the request awaiting it.
    ///
    /// Returns `false` if no request with this ID is pending (e.g. it was
    /// cancelled before the response arrived).
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value, JsonRpcErrorData>) -> bool {
        let sender = self
            .pending
            .lock()
            .expect("pending map lock poisoned")
            .remove(id);

        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Sends a generation request to the client backend and awaits the
    /// generated text or the caller's cancellation, whichever comes first.
    ///
    /// # Errors
    ///
    /// - [`McpError::Cancelled`] if `cancel` fires before a response arrives.
    /// - [`McpError::Bridge`] on a backend-reported failure; the backend's
    ///   message and nested cause are both preserved.
    /// - [`McpError::TransportClosed`] if the outbound channel is gone.
    pub async fn request_sampling(
        &self,
        params: CreateMessageParams,
        cancel: &CancellationToken,
    ) -> Result<String, McpError> {
        let id = RequestId::String(format!(
            "srv-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));

        let params_value = serde_json::to_value(&params).map_err(|e| McpError::Bridge {
            message: format!("failed to serialise sampling params: {e}"),
            source: None,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(id.clone(), tx);

        let request = OutgoingRequest::new(id.clone(), "sampling/createMessage", Some(params_value));
        if let Err(e) = self.outbox.send_request(request).await {
            self.forget(&id);
            return Err(e);
        }

        tokio::select! {
            () = cancel.cancelled() => {
                self.forget(&id);
                Err(McpError::Cancelled)
            }
            outcome = rx => match outcome {
                Err(_) => Err(McpError::Bridge {
                    message: "sampling channel closed before a response arrived".to_string(),
                    source: None,
                }),
                Ok(Err(error)) => Err(McpError::Bridge {
                    message: error.message,
                    source: error.data.map(|data| BridgeCause(render_cause(&data))),
                }),
                Ok(Ok(result)) => extract_text(&result),
            },
        }
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending map lock poisoned").len()
    }

    fn forget(&self, id: &RequestId) {
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .remove(id);
    }
}

/// Renders a backend-supplied cause value as a plain string.
fn render_cause(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pulls the generated text out of a `sampling/createMessage` result.
fn extract_text(result: &Value) -> Result<String, McpError> {
    result
        .get("content")
        .and_then(|content| content.get("text"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| McpError::Bridge {
            message: "sampling result is missing content.text".to_string(),
            source: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::OutboundMessage;

    fn ack_params(uri: &str) -> CreateMessageParams {
        CreateMessageParams {
            messages: vec![
                SamplingMessage::new(Role::System, "You are a helpful test server"),
                SamplingMessage::new(Role::User, format!("Resource {uri}")),
            ],
            system_prompt: None,
            max_tokens: 100,
            temperature: Some(0.7),
            include_context: None,
        }
    }

    #[tokio::test]
    async fn request_resolves_with_generated_text() {
        let (outbox, mut rx) = Outbox::channel();
        let bridge = std::sync::Arc::new(SamplingBridge::new(outbox));
        let cancel = CancellationToken::new();

        let responder = {
            let bridge = std::sync::Arc::clone(&bridge);
            tokio::spawn(async move {
                let OutboundMessage::Request(request) = rx.recv().await.unwrap() else {
                    panic!("Expected outgoing request");
                };
                assert_eq!(request.method, "sampling/createMessage");
                bridge.resolve(
                    &request.id,
                    Ok(serde_json::json!({
                        "role": "assistant",
                        "content": { "type": "text", "text": "generated" },
                    })),
                );
            })
        };

        let text = bridge
            .request_sampling(ack_params("test://direct/text/resource"), &cancel)
            .await
            .unwrap();
        assert_eq!(text, "generated");
        assert_eq!(bridge.pending_len(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn backend_error_surfaces_message_and_cause() {
        let (outbox, mut rx) = Outbox::channel();
        let bridge = std::sync::Arc::new(SamplingBridge::new(outbox));
        let cancel = CancellationToken::new();

        let responder = {
            let bridge = std::sync::Arc::clone(&bridge);
            tokio::spawn(async move {
                let OutboundMessage::Request(request) = rx.recv().await.unwrap() else {
                    panic!("Expected outgoing request");
                };
                bridge.resolve(
                    &request.id,
                    Err(JsonRpcErrorData {
                        code: -1,
                        message: "backend unavailable".to_string(),
                        data: Some(serde_json::json!("connection refused")),
                    }),
                );
            })
        };

        let err = bridge
            .request_sampling(ack_params("test://direct/text/resource"), &cancel)
            .await
            .unwrap_err();

        let McpError::Bridge { message, source } = err else {
            panic!("Expected Bridge error, got {err:?}");
        };
        assert_eq!(message, "backend unavailable");
        assert_eq!(source.unwrap().0, "connection refused");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_unblocks_the_wait() {
        let (outbox, mut rx) = Outbox::channel();
        let bridge = SamplingBridge::new(outbox);
        let cancel = CancellationToken::new();

        // Swallow the outgoing request but never respond
        let drain = tokio::spawn(async move {
            let _ = rx.recv().await;
            // Keep the channel open so the send does not fail
            std::future::pending::<()>().await;
        });

        cancel.cancel();
        let err = bridge
            .request_sampling(ack_params("test://direct/text/resource"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, McpError::Cancelled));
        assert_eq!(bridge.pending_len(), 0);
        drain.abort();
    }

    #[tokio::test]
    async fn malformed_result_is_a_bridge_error() {
        let (outbox, mut rx) = Outbox::channel();
        let bridge = std::sync::Arc::new(SamplingBridge::new(outbox));
        let cancel = CancellationToken::new();

        let responder = {
            let bridge = std::sync::Arc::clone(&bridge);
            tokio::spawn(async move {
                let OutboundMessage::Request(request) = rx.recv().await.unwrap() else {
                    panic!("Expected outgoing request");
                };
                bridge.resolve(&request.id, Ok(serde_json::json!({ "role": "assistant" })));
            })
        };

        let err = bridge
            .request_sampling(ack_params("test://direct/text/resource"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Bridge { .. }));
        responder.await.unwrap();
    }

    #[test]
    fn resolve_unknown_id_is_ignored() {
        let (outbox, _rx) = Outbox::channel();
        let bridge = SamplingBridge::new(outbox);

        let handled = bridge.resolve(
            &RequestId::String("srv-99".to_string()),
            Ok(serde_json::json!({})),
        );
        assert!(!handled);
    }

    #[test]
    fn params_serialise_camel_case() {
        let params = CreateMessageParams {
            messages: vec![SamplingMessage::new(Role::User, "hello")],
            system_prompt: Some("You are a helpful server".to_string()),
            max_tokens: 2000,
            temperature: Some(0.7),
            include_context: Some(ContextInclusion::ThisServer),
        };
        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json["systemPrompt"], "You are a helpful server");
        assert_eq!(json["maxTokens"], 2000);
        assert_eq!(json["includeContext"], "thisServer");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"]["type"], "text");
    }
}
