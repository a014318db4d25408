//! Shared mutable server state.
//!
//! The subscription set and the minimum logging level are the only pieces of
//! state mutated after startup. Both are owned by [`ServerState`] and passed
//! explicitly to the dispatcher's handlers and to the notification
//! schedulers; nothing captures them ambiently.
//!
//! Handlers and schedulers run on independent tasks, so access goes through
//! short-lived `std::sync::Mutex` critical sections. The resource-update
//! scheduler works from a [`SubscriptionRegistry::snapshot`] copy, so a
//! subscribe racing a tick either lands in that tick's snapshot or the next
//! one; it can never corrupt iteration.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// MCP logging severity levels, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed debugging information.
    #[default]
    Debug,
    /// Informational messages.
    Info,
    /// Normal but significant events.
    Notice,
    /// Warning conditions.
    Warning,
    /// Error conditions.
    Error,
    /// Critical conditions.
    Critical,
    /// Action must be taken immediately.
    Alert,
    /// System is unusable.
    Emergency,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// The set of resource URIs the client has subscribed to.
///
/// Mutated only through [`subscribe`](Self::subscribe) and
/// [`unsubscribe`](Self::unsubscribe); the resource-update scheduler reads
/// it through [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    uris: Mutex<HashSet<String>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a URI to the subscription set.
    ///
    /// Returns `false` if the URI was already subscribed.
    pub fn subscribe(&self, uri: impl Into<String>) -> bool {
        self.uris
            .lock()
            .expect("subscription lock poisoned")
            .insert(uri.into())
    }

    /// Removes a URI from the subscription set.
    ///
    /// Removing a URI that is not present is a no-op, not an error;
    /// returns `false` in that case.
    pub fn unsubscribe(&self, uri: &str) -> bool {
        self.uris
            .lock()
            .expect("subscription lock poisoned")
            .remove(uri)
    }

    /// Returns a copy of the current subscription set.
    ///
    /// The copy is taken under the lock, so it never observes a partial
    /// mutation. Concurrent subscribes may or may not appear, which is
    /// acceptable for the scheduler's per-tick view.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.uris
            .lock()
            .expect("subscription lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.uris.lock().expect("subscription lock poisoned").len()
    }

    /// Returns `true` if no URIs are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-wide minimum logging level.
///
/// Replaced wholesale by `logging/setLevel`; read by the logging scheduler
/// at emission time. No history is kept.
#[derive(Debug, Default)]
pub struct LogLevelState {
    level: Mutex<LogLevel>,
}

impl LogLevelState {
    /// Creates the state with the default level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current level.
    #[must_use]
    pub fn get(&self) -> LogLevel {
        *self.level.lock().expect("log level lock poisoned")
    }

    /// Replaces the current level.
    pub fn set(&self, level: LogLevel) {
        *self.level.lock().expect("log level lock poisoned") = level;
    }
}

/// All mutable state shared between handlers and schedulers.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Active resource subscriptions.
    pub subscriptions: SubscriptionRegistry,
    /// Current minimum logging level.
    pub log_level: LogLevelState,
}

impl ServerState {
    /// Creates fresh state: no subscriptions, default logging level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent_on_the_set() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.subscribe("test://direct/text/resource"));
        assert!(!registry.subscribe("test://direct/text/resource"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unsubscribe_missing_uri_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("test://template/resource/1");

        assert!(!registry.unsubscribe("test://template/resource/2"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_copies_current_set() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("test://template/resource/1");
        registry.subscribe("test://template/resource/2");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        // Mutations after the snapshot do not affect the copy
        registry.unsubscribe("test://template/resource/1");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn log_level_replacement_is_visible() {
        let state = LogLevelState::new();
        assert_eq!(state.get(), LogLevel::Debug);

        state.set(LogLevel::Warning);
        assert_eq!(state.get(), LogLevel::Warning);
    }

    #[test]
    fn log_levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Emergency);
    }

    #[test]
    fn log_level_serialises_lowercase() {
        let json = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(json, r#""warning""#);

        let level: LogLevel = serde_json::from_str(r#""error""#).unwrap();
        assert_eq!(level, LogLevel::Error);
    }
}
