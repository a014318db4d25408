//! Method dispatch table.
//!
//! An explicit mapping from method name to handler function, built once at
//! startup. Handlers are plain `fn` pointers returning boxed futures so the
//! table itself stays cheap to clone behind an `Arc`. Registering the same
//! method twice is a programmer error and panics during startup, before the
//! server accepts any input.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::McpError;
use crate::mcp::server::ServerContext;

/// The future returned by a request handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, McpError>> + Send>>;

/// A request handler: typed params in, result value or error out.
///
/// The cancellation token is scoped to the single request and fires if the
/// client cancels it or the server shuts down.
pub type RequestHandler =
    fn(Arc<ServerContext>, Option<Value>, CancellationToken) -> HandlerFuture;

/// Maps method names to their handlers. One handler per method.
#[derive(Debug, Default)]
pub struct Dispatcher {
    handlers: HashMap<&'static str, RequestHandler>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a method.
    ///
    /// # Panics
    ///
    /// Panics if a handler is already registered for `method`.
    pub fn register(&mut self, method: &'static str, handler: RequestHandler) {
        assert!(
            self.handlers.insert(method, handler).is_none(),
            "duplicate handler registration for method: {method}"
        );
    }

    /// Looks up the handler for a method.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnsupportedMethod`] naming the method if no
    /// handler is registered.
    pub fn dispatch(&self, method: &str) -> Result<RequestHandler, McpError> {
        self.handlers
            .get(method)
            .copied()
            .ok_or_else(|| McpError::UnsupportedMethod {
                method: method.to_string(),
            })
    }

    /// Returns the registered method names.
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
