//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! # Thread Safety
//!
//! Reading is owned by the server's main loop. Writing is funnelled through
//! an [`Outbox`]: request handlers, the sampling bridge and both notification
//! schedulers each hold a cheap clone of the sender half, and a single writer
//! task owns stdout. This serialises all outbound messages through one FIFO
//! channel, so messages queued by one component are never reordered.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::McpError;
use crate::mcp::protocol::{
    JsonRpcError, JsonRpcResponse, OutgoingNotification, OutgoingRequest,
};

/// Default outbox channel capacity.
const OUTBOX_CAPACITY: usize = 64;

/// An outbound JSON-RPC message awaiting serialisation.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// A success response to a client request.
    Response(JsonRpcResponse),
    /// An error response to a client request.
    Error(JsonRpcError),
    /// A server-initiated notification.
    Notification(OutgoingNotification),
    /// A server-initiated request (sampling).
    Request(OutgoingRequest),
}

/// A cloneable handle for queueing outbound messages.
///
/// Sends fail with [`McpError::TransportClosed`] once the writer task
/// has stopped.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Outbox {
    /// Creates an outbox and the receiver half for a writer task.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queues a success response.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::TransportClosed`] if the writer task has stopped.
    pub async fn send_response(&self, response: JsonRpcResponse) -> Result<(), McpError> {
        self.send(OutboundMessage::Response(response)).await
    }

    /// Queues an error response.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::TransportClosed`] if the writer task has stopped.
    pub async fn send_error(&self, error: JsonRpcError) -> Result<(), McpError> {
        self.send(OutboundMessage::Error(error)).await
    }

    /// Queues a notification.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::TransportClosed`] if the writer task has stopped.
    pub async fn send_notification(
        &self,
        notification: OutgoingNotification,
    ) -> Result<(), McpError> {
        self.send(OutboundMessage::Notification(notification)).await
    }

    /// Queues a server-initiated request.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::TransportClosed`] if the writer task has stopped.
    pub async fn send_request(&self, request: OutgoingRequest) -> Result<(), McpError> {
        self.send(OutboundMessage::Request(request)).await
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), McpError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| McpError::TransportClosed)
    }
}

/// Drains the outbox and writes each message to stdout, newline-terminated.
///
/// Runs until every [`Outbox`] clone has been dropped. A failed write is
/// logged and the loop continues with the next message; stdout write errors
/// are treated as transient.
pub async fn run_stdout_writer(mut rx: mpsc::Receiver<OutboundMessage>) {
    let mut stdout = tokio::io::stdout();

    while let Some(message) = rx.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise outbound message");
                continue;
            }
        };

        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        if let Err(e) = write_line(&mut stdout, &json).await {
            tracing::warn!(error = %e, "Failed to write outbound message");
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, json: &str) -> io::Result<()> {
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// A stdio-based MCP transport reader.
///
/// Handles reading JSON-RPC messages from stdin, one per line.
pub struct StdioTransport {
    /// Buffered reader for stdin.
    reader: BufReader<tokio::io::Stdin>,
}

impl StdioTransport {
    /// Creates a new stdio transport reader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }

    /// Reads the next message line from stdin.
    ///
    /// Returns `None` if stdin is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            // EOF - stdin closed
            return Ok(None);
        }

        // Remove the trailing newline
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}
