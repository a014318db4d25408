//! Model Context Protocol (MCP) server implementation.
//!
//! This module implements the MCP specification for a protocol-exercising
//! test server. The server communicates over stdio transport using
//! JSON-RPC 2.0 messages, one per line.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MCP Server                           │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │   │  Transport  │───▶│   Server    │───▶│  Dispatcher │      │
//! │   │   (stdio)   │    │  (lifecycle)│    │  (handlers) │      │
//! │   └─────────────┘    └─────────────┘    └─────────────┘      │
//! │          │                  │                  │             │
//! │          ▼                  ▼                  ▼             │
//! │   ┌──────────────────────────────────────────────────┐      │
//! │   │          Outbox (single stdout writer)           │      │
//! │   └──────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatch;
pub mod protocol;
pub mod server;
pub mod transport;

pub use dispatch::Dispatcher;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{Outbox, StdioTransport};
