//! mcp-testbed: an MCP test server exercising the protocol surface
//!
//! This library implements a Model Context Protocol server whose sole
//! purpose is exercising client implementations: every part of the protocol
//! surface is represented by small, deterministic test fixtures.
//!
//! # What the server exposes
//!
//! - **Resources**: one direct text resource plus 100 template-addressed
//!   resources alternating text and binary content
//! - **Subscriptions**: per-URI update notifications on a fixed period,
//!   each new subscription acknowledged through client-side sampling
//! - **Tools**: an echo tool, a sampling-backed summary tool, and a
//!   progress-reporting tool with a degraded-result contract
//! - **Prompts**: a basic prompt and a multi-message prompt with an
//!   embedded image
//! - **Completions**: static argument and resource-ID completion
//! - **Logging**: client-settable minimum level with periodic reports
//!
//! # Modules
//!
//! - [`completion`] — Static completion index
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types and JSON-RPC error mapping
//! - [`mcp`] — Protocol types, transport, dispatch, and the server itself
//! - [`prompts`] — Prompt registry
//! - [`resources`] — Resource catalogue and template resolution
//! - [`sampling`] — Bridge for server-initiated sampling requests
//! - [`scheduler`] — Periodic notification tasks
//! - [`state`] — Mutable session state (subscriptions, logging level)
//! - [`tools`] — Tool registry and handlers

pub mod completion;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prompts;
pub mod resources;
pub mod sampling;
pub mod scheduler;
pub mod state;
pub mod tools;
