//! Integration tests for MCP protocol handling.
//!
//! These tests verify the server's JSON-RPC 2.0 protocol implementation and
//! drive complete request flows through the dispatcher: subscription with
//! its sampling acknowledgment, resource reads, completion, tools, and
//! prompts.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use mcp_testbed::error::McpError;
use mcp_testbed::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use mcp_testbed::mcp::server::{build_dispatcher, ServerContext};
use mcp_testbed::mcp::transport::{Outbox, OutboundMessage};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_response_routing() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "srv-1",
        "result": { "content": { "type": "text", "text": "ok" } }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Response(resp) = result.unwrap() {
        assert_eq!(resp.id, RequestId::String("srv-1".to_string()));
        assert!(resp.error.is_none());
    } else {
        panic!("Expected Response");
    }
}

#[test]
fn test_parse_invalid_json() {
    let json = "not valid json";

    let result = parse_message(json);
    assert!(result.is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let result = parse_message(json);
    assert!(result.is_err());
}

// =============================================================================
// Dispatched Request Flows
// =============================================================================

fn test_context() -> (
    Arc<ServerContext>,
    tokio::sync::mpsc::Receiver<OutboundMessage>,
) {
    let (outbox, rx) = Outbox::channel();
    (Arc::new(ServerContext::new(outbox)), rx)
}

async fn dispatch(
    ctx: &Arc<ServerContext>,
    method: &str,
    params: Value,
) -> Result<Value, McpError> {
    let dispatcher = build_dispatcher();
    let handler = dispatcher.dispatch(method).expect("method registered");
    handler(Arc::clone(ctx), Some(params), CancellationToken::new()).await
}

/// Answers exactly one sampling request coming through the outbox and
/// returns its first user-message text for inspection.
fn spawn_sampling_responder(
    ctx: Arc<ServerContext>,
    mut rx: tokio::sync::mpsc::Receiver<OutboundMessage>,
) -> tokio::task::JoinHandle<String> {
    tokio::spawn(async move {
        let request = loop {
            match rx.recv().await.expect("outbox open") {
                OutboundMessage::Request(request) => break request,
                // Scheduler or confirmation notifications may interleave
                _ => continue,
            }
        };
        assert_eq!(request.method, "sampling/createMessage");

        let params = request.params.expect("sampling params present");
        let user_text = params["messages"][1]["content"]["text"]
            .as_str()
            .expect("user message text")
            .to_string();

        ctx.bridge.resolve(
            &request.id,
            Ok(json!({
                "role": "assistant",
                "content": { "type": "text", "text": "acknowledged" },
            })),
        );

        user_text
    })
}

#[tokio::test]
async fn subscribe_registers_and_acknowledges_through_sampling() {
    let (ctx, rx) = test_context();
    let responder = spawn_sampling_responder(Arc::clone(&ctx), rx);

    let uri = "test://template/resource/3";
    let result = dispatch(&ctx, "resources/subscribe", json!({ "uri": uri }))
        .await
        .unwrap();
    assert_eq!(result, json!({}));

    // Exactly one sampling request went out, naming the subscribed URI
    let user_text = responder.await.unwrap();
    assert_eq!(
        user_text,
        "Resource test://template/resource/3, context: A new subscription was started"
    );
    assert_eq!(ctx.state.subscriptions.len(), 1);
    assert_eq!(ctx.bridge.pending_len(), 0);
}

#[tokio::test]
async fn unsubscribe_empties_the_registry() {
    let (ctx, rx) = test_context();
    let responder = spawn_sampling_responder(Arc::clone(&ctx), rx);

    let uri = "test://direct/text/resource";
    dispatch(&ctx, "resources/subscribe", json!({ "uri": uri }))
        .await
        .unwrap();
    responder.await.unwrap();

    let result = dispatch(&ctx, "resources/unsubscribe", json!({ "uri": uri }))
        .await
        .unwrap();
    assert_eq!(result, json!({}));
    assert!(ctx.state.subscriptions.is_empty());

    // Unsubscribing again is a quiet no-op
    dispatch(&ctx, "resources/unsubscribe", json!({ "uri": uri }))
        .await
        .unwrap();
    assert!(ctx.state.subscriptions.is_empty());
}

#[tokio::test]
async fn read_direct_and_template_resources() {
    let (ctx, _rx) = test_context();

    let direct = dispatch(
        &ctx,
        "resources/read",
        json!({ "uri": "test://direct/text/resource" }),
    )
    .await
    .unwrap();
    assert_eq!(direct["contents"][0]["text"], "This is a direct resource");

    let templated = dispatch(
        &ctx,
        "resources/read",
        json!({ "uri": "test://template/resource/1" }),
    )
    .await
    .unwrap();
    assert_eq!(templated["contents"][0]["mimeType"], "text/plain");

    let blob = dispatch(
        &ctx,
        "resources/read",
        json!({ "uri": "test://template/resource/2" }),
    )
    .await
    .unwrap();
    assert_eq!(blob["contents"][0]["mimeType"], "application/octet-stream");
    assert!(blob["contents"][0]["blob"].is_string());
}

#[tokio::test]
async fn read_unknown_resource_is_an_error() {
    let (ctx, _rx) = test_context();

    let err = dispatch(
        &ctx,
        "resources/read",
        json!({ "uri": "test://template/resource/0" }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, McpError::UnknownResource { .. }));

    let rpc = err.to_rpc_error(RequestId::Number(1));
    assert_eq!(rpc.error.code, -32002);
}

#[tokio::test]
async fn resource_lists_cover_direct_and_templates() {
    let (ctx, _rx) = test_context();

    let listed = dispatch(&ctx, "resources/list", json!({})).await.unwrap();
    assert_eq!(listed["resources"].as_array().unwrap().len(), 1);

    let templates = dispatch(&ctx, "resources/templates/list", json!({}))
        .await
        .unwrap();
    assert_eq!(
        templates["resourceTemplates"][0]["uriTemplate"],
        "test://template/resource/{id}"
    );
}

#[tokio::test]
async fn completion_filters_by_prefix() {
    let (ctx, _rx) = test_context();

    let result = dispatch(
        &ctx,
        "completion/complete",
        json!({
            "ref": { "type": "ref/prompt", "name": "communityComplexPrompt" },
            "argument": { "name": "style", "value": "f" },
        }),
    )
    .await
    .unwrap();

    assert_eq!(result["completion"]["values"], json!(["formal", "friendly"]));
    assert_eq!(result["completion"]["hasMore"], false);
}

#[tokio::test]
async fn completion_for_resource_reference_lists_ids() {
    let (ctx, _rx) = test_context();

    let result = dispatch(
        &ctx,
        "completion/complete",
        json!({
            "ref": { "type": "ref/resource", "uri": "test://template/resource/{id}" },
            "argument": { "name": "id", "value": "" },
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        result["completion"]["values"],
        json!(["1", "2", "3", "4", "5"])
    );
}

#[tokio::test]
async fn echo_tool_round_trip() {
    let (ctx, _rx) = test_context();

    let result = dispatch(
        &ctx,
        "tools/call",
        json!({ "name": "echo", "arguments": { "message": "hello" } }),
    )
    .await
    .unwrap();

    assert_eq!(result["content"][0]["text"], "Echo: hello");
}

#[tokio::test]
async fn unknown_tool_is_a_tool_level_error() {
    let (ctx, _rx) = test_context();

    let result = dispatch(
        &ctx,
        "tools/call",
        json!({ "name": "nonexistent", "arguments": {} }),
    )
    .await
    .unwrap();

    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Unknown tool: nonexistent");
}

#[tokio::test]
async fn complex_prompt_renders_year_and_image() {
    let (ctx, _rx) = test_context();

    let result = dispatch(
        &ctx,
        "prompts/get",
        json!({ "name": "communityComplexPrompt", "arguments": { "year": 2026 } }),
    )
    .await
    .unwrap();

    let messages = result["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages[0]["content"]["text"]
        .as_str()
        .unwrap()
        .contains("2026"));
    assert_eq!(messages[2]["content"]["type"], "image");
}

#[tokio::test]
async fn prompt_missing_required_argument_is_invalid_params() {
    let (ctx, _rx) = test_context();

    let err = dispatch(
        &ctx,
        "prompts/get",
        json!({ "name": "communityComplexPrompt", "arguments": {} }),
    )
    .await
    .unwrap_err();

    let rpc = err.to_rpc_error(RequestId::Number(7));
    assert_eq!(rpc.error.code, -32602);
    assert!(rpc.error.message.contains("year"));
}
