//! Periodic notification schedulers.
//!
//! Two independent background tasks run for the lifetime of the server:
//! one emits a resource-updated notification per subscribed URI on a fixed
//! period, the other periodically reports the current logging level. Each
//! loop exits only when the shutdown token fires; a failed outbox send is
//! logged and the loop continues to the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::mcp::protocol::{OutgoingNotification, SERVER_NAME};
use crate::mcp::transport::Outbox;
use crate::state::ServerState;

/// Spawns the resource-update scheduler.
///
/// Each tick takes a snapshot of the subscription registry and emits one
/// `notifications/resources/updated` per subscribed URI. An empty snapshot
/// produces a quiet tick.
pub fn spawn_resource_update_scheduler(
    state: Arc<ServerState>,
    outbox: Outbox,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(period_secs = period.as_secs(), "Resource-update scheduler running");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = state.subscriptions.snapshot();
                    for uri in snapshot {
                        let notification = OutgoingNotification::resource_updated(&uri);
                        if let Err(e) = outbox.send_notification(notification).await {
                            tracing::warn!(error = %e, uri, "Failed to send resource-updated notification");
                        }
                    }
                }
            }
        }

        tracing::debug!("Resource-update scheduler stopped");
    })
}

/// Spawns the logging scheduler.
///
/// Each tick reads the current minimum logging level (at emission time, so
/// level changes are reflected on the next tick) and emits one
/// `notifications/message` carrying it.
pub fn spawn_logging_scheduler(
    state: Arc<ServerState>,
    outbox: Outbox,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(period_secs = period.as_secs(), "Logging scheduler running");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let level = state.log_level.get();
                    let notification = OutgoingNotification::logging_message(
                        &level.to_string(),
                        SERVER_NAME,
                        format!("Current minimum logging level is {level}"),
                    );
                    if let Err(e) = outbox.send_notification(notification).await {
                        tracing::warn!(error = %e, "Failed to send logging notification");
                    }
                }
            }
        }

        tracing::debug!("Logging scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::OutboundMessage;
    use crate::state::LogLevel;

    async fn recv_notification(
        rx: &mut tokio::sync::mpsc::Receiver<OutboundMessage>,
    ) -> OutgoingNotification {
        match rx.recv().await.expect("channel open") {
            OutboundMessage::Notification(notif) => notif,
            other => panic!("Expected notification, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_notification_per_subscribed_uri_per_tick() {
        let state = Arc::new(ServerState::new());
        state.subscriptions.subscribe("test://template/resource/1");
        state.subscriptions.subscribe("test://template/resource/2");

        let (outbox, mut rx) = Outbox::channel();
        let shutdown = CancellationToken::new();
        let handle = spawn_resource_update_scheduler(
            Arc::clone(&state),
            outbox,
            Duration::from_secs(5),
            shutdown.clone(),
        );

        // First tick fires immediately; expect exactly one notification per
        // snapshot entry
        let first = recv_notification(&mut rx).await;
        let second = recv_notification(&mut rx).await;

        let mut uris: Vec<String> = [first, second]
            .iter()
            .map(|n| n.params.as_ref().unwrap()["uri"].as_str().unwrap().to_string())
            .collect();
        uris.sort();
        assert_eq!(
            uris,
            vec![
                "test://template/resource/1".to_string(),
                "test://template/resource/2".to_string()
            ]
        );

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_snapshot_produces_no_notifications() {
        let state = Arc::new(ServerState::new());
        let (outbox, mut rx) = Outbox::channel();
        let shutdown = CancellationToken::new();
        let handle = spawn_resource_update_scheduler(
            Arc::clone(&state),
            outbox,
            Duration::from_secs(5),
            shutdown.clone(),
        );

        // Let a few ticks elapse with no subscriptions
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(rx.try_recv().is_err());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn logging_scheduler_reads_level_at_emission_time() {
        let state = Arc::new(ServerState::new());
        let (outbox, mut rx) = Outbox::channel();
        let shutdown = CancellationToken::new();
        let handle = spawn_logging_scheduler(
            Arc::clone(&state),
            outbox,
            Duration::from_secs(5),
            shutdown.clone(),
        );

        // First tick reports the default level
        let notif = recv_notification(&mut rx).await;
        assert_eq!(notif.method, "notifications/message");
        assert_eq!(notif.params.as_ref().unwrap()["level"], "debug");

        // Replace the level; the next tick must reflect it
        state.log_level.set(LogLevel::Error);
        let notif = recv_notification(&mut rx).await;
        assert_eq!(notif.params.as_ref().unwrap()["level"], "error");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn schedulers_stop_on_shutdown() {
        let state = Arc::new(ServerState::new());
        let (outbox, _rx) = Outbox::channel();
        let shutdown = CancellationToken::new();

        let resource = spawn_resource_update_scheduler(
            Arc::clone(&state),
            outbox.clone(),
            Duration::from_secs(5),
            shutdown.clone(),
        );
        let logging = spawn_logging_scheduler(
            Arc::clone(&state),
            outbox,
            Duration::from_secs(5),
            shutdown.clone(),
        );

        shutdown.cancel();
        resource.await.unwrap();
        logging.await.unwrap();
    }
}
