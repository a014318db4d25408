//! Error types for mcp-testbed.
//!
//! Handler-level failures are modelled as [`McpError`] variants with a
//! stable machine-readable JSON-RPC code and a human-readable message.
//! Nested causes (e.g. a backend error forwarded through the sampling
//! bridge) are preserved as error sources rather than discarded.

use std::path::PathBuf;

use thiserror::Error;

use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcErrorData, RequestId};

/// A nested cause reported by the client's model backend.
///
/// Carried as the `source` of [`McpError::Bridge`] so callers can walk the
/// error chain, and serialised into the error response's `data` field.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct BridgeCause(pub String);

/// Errors surfaced by request handlers and the protocol core.
#[derive(Error, Debug)]
pub enum McpError {
    /// The requested URI matches no catalogued resource.
    #[error("unknown resource: {uri}")]
    UnknownResource {
        /// The URI the client asked for.
        uri: String,
    },

    /// A completion request used a reference type this server does not support.
    #[error("unknown reference type: {ref_type}")]
    UnsupportedReferenceType {
        /// The offending reference type.
        ref_type: String,
    },

    /// A completion request named an argument with no candidate list.
    #[error("unknown argument name: {name}")]
    UnknownArgument {
        /// The offending argument name.
        name: String,
    },

    /// Request parameters were missing or malformed.
    #[error("{message}")]
    InvalidParams {
        /// Description of what was missing or malformed.
        message: String,
    },

    /// No handler is registered for the requested method.
    #[error("method not found: {method}")]
    UnsupportedMethod {
        /// The offending method name.
        method: String,
    },

    /// The sampling backend reported a failure.
    #[error("sampling request failed: {message}")]
    Bridge {
        /// The backend's error message.
        message: String,
        /// Nested cause reported by the backend, when present.
        #[source]
        source: Option<BridgeCause>,
    },

    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The outbound channel to the client is closed.
    #[error("transport closed")]
    TransportClosed,
}

impl McpError {
    /// Creates an invalid-params error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Converts this error into a JSON-RPC error response for the given request.
    #[must_use]
    pub fn to_rpc_error(&self, id: RequestId) -> JsonRpcError {
        let code = match self {
            Self::UnknownResource { .. } => ErrorCode::ResourceNotFound,
            Self::UnsupportedReferenceType { .. }
            | Self::UnknownArgument { .. }
            | Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::UnsupportedMethod { .. } => ErrorCode::MethodNotFound,
            Self::Cancelled => ErrorCode::RequestCancelled,
            Self::Bridge { .. } | Self::TransportClosed => ErrorCode::InternalError,
        };

        let mut data = JsonRpcErrorData::with_message(code, self.to_string());

        // Expose the backend's nested cause instead of discarding it
        if let Self::Bridge {
            source: Some(cause),
            ..
        } = self
        {
            data = data.with_data(serde_json::json!({ "cause": cause.0 }));
        }

        JsonRpcError::new(Some(id), data)
    }
}

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}
