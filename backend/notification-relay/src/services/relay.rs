/// Notification Relay
///
/// Owns the session registry and wires the handshake, dispatcher and status
/// notifier together. Transport adapters feed connect/disconnect events in;
/// the HTTP surface calls `push_notification` and `health_check_data`.
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::dispatcher::{DispatchCounters, DispatchReceipt, NotificationDispatcher};
use super::handshake::{RegistrationHandshake, RegistrationOutcome};
use super::status_notifier::{StatusNotifier, StatusReporter};
use crate::config::WebSocketConfig;
use crate::models::{
    ConnectionId, DispatchStatus, HandshakeMetadata, HealthSnapshot, NotificationMessage,
    NotificationReason, SessionId,
};
use crate::websocket::{ClientConnection, ConnectionRegistry};

pub struct NotificationRelay {
    registry: ConnectionRegistry,
    handshake: RegistrationHandshake,
    dispatcher: NotificationDispatcher,
    notifier: StatusNotifier,
    counters: Arc<DispatchCounters>,
}

impl NotificationRelay {
    pub fn new(reporter: Arc<dyn StatusReporter>, settings: &WebSocketConfig) -> Self {
        Self::with_request_timeout(reporter, settings.request_timeout())
    }

    pub fn with_request_timeout(reporter: Arc<dyn StatusReporter>, request_timeout: Duration) -> Self {
        let registry = ConnectionRegistry::new();
        let notifier = StatusNotifier::new(reporter);
        let counters = Arc::new(DispatchCounters::new());

        Self {
            handshake: RegistrationHandshake::new(
                registry.clone(),
                notifier.clone(),
                request_timeout,
            ),
            dispatcher: NotificationDispatcher::new(
                registry.clone(),
                counters.clone(),
                request_timeout,
            ),
            registry,
            notifier,
            counters,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Transport event: a connection was opened
    pub async fn handle_connect(
        &self,
        connection: Arc<dyn ClientConnection>,
        metadata: &HandshakeMetadata,
    ) -> RegistrationOutcome {
        self.handshake.run(connection, metadata).await
    }

    /// Transport event: a connection went away.
    ///
    /// Returns whether a registry entry was removed. An entry that already
    /// belongs to a newer connection is left alone.
    pub async fn handle_disconnect(
        &self,
        connection_id: ConnectionId,
        metadata: &HandshakeMetadata,
    ) -> bool {
        let session_id = match SessionId::parse(metadata.session_id.as_deref()) {
            Ok(session_id) => session_id,
            Err(_) => {
                info!(connection_id = %connection_id, "Socket without session id disconnected");
                return false;
            }
        };

        info!(
            session_id = %session_id,
            connection_id = %connection_id,
            "--- Socket disconnected"
        );

        if let Some(record) = self
            .registry
            .remove_if_owned(&session_id, connection_id)
            .await
        {
            self.notifier.notify(
                NotificationReason::ClientDisconnected,
                &session_id,
                record.client_context.as_ref(),
            );
            return true;
        }

        // Nothing removed: either a newer connection owns the session or
        // the entry is already gone. Neither case may touch the registry.
        match self.registry.get(&session_id).await {
            Some(record) => {
                warn!(
                    session_id = %session_id,
                    connection_id = %connection_id,
                    current_connection_id = %record.connection_id(),
                    "Ignoring disconnect of superseded connection"
                );
            }
            None => {
                self.notifier
                    .notify(NotificationReason::ClientDisconnected, &session_id, None);
                warn!(session_id = %session_id, "Connection not found in registry");
            }
        }

        false
    }

    /// Route a notification to its session; 200 when handed to a live
    /// connection, 500 otherwise
    pub async fn push_notification(&self, message: NotificationMessage) -> DispatchStatus {
        self.dispatcher.dispatch(message).await
    }

    /// Like `push_notification`, but also returns the acknowledgment task
    pub async fn push_notification_tracked(&self, message: NotificationMessage) -> DispatchReceipt {
        self.dispatcher.dispatch_with_receipt(message).await
    }

    pub async fn health_check_data(&self) -> HealthSnapshot {
        HealthSnapshot {
            total_connected_clients: self.registry.len().await,
            notifications_pushed: self.counters.processed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::status_notifier::test_support::RecordingReporter;
    use crate::websocket::connection::test_support::StubConnection;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn relay() -> (NotificationRelay, mpsc::UnboundedReceiver<Value>) {
        let (reporter, reports) = RecordingReporter::new();
        (
            NotificationRelay::with_request_timeout(reporter, Duration::from_millis(50)),
            reports,
        )
    }

    fn alice() -> Arc<StubConnection> {
        Arc::new(StubConnection::replying(json!({
            "status": 200,
            "clientContext": { "name": "Alice" }
        })))
    }

    fn snapshot(total: usize, pushed: u64) -> HealthSnapshot {
        HealthSnapshot {
            total_connected_clients: total,
            notifications_pushed: pushed,
        }
    }

    #[tokio::test]
    async fn test_registered_session_receives_notification() {
        let (relay, _reports) = relay();
        let conn = alice();
        conn.push_reply(Ok(Some(json!({ "status": 200 }))));

        let outcome = relay
            .handle_connect(conn.clone(), &HandshakeMetadata::with_session("abc"))
            .await;
        assert!(outcome.is_registered());

        let status = relay
            .push_notification(NotificationMessage::new("abc", "hi"))
            .await;

        assert_eq!(status.code(), 200);
        assert_eq!(relay.health_check_data().await, snapshot(1, 1));
    }

    #[tokio::test]
    async fn test_unknown_session_counts_attempt() {
        let (relay, _reports) = relay();

        let status = relay
            .push_notification(NotificationMessage::new("ghost", "hi"))
            .await;

        assert_eq!(status.code(), 500);
        assert_eq!(relay.health_check_data().await, snapshot(0, 1));
    }

    #[tokio::test]
    async fn test_blank_session_is_never_registered() {
        let (relay, _reports) = relay();

        relay
            .handle_connect(
                Arc::new(StubConnection::new()),
                &HandshakeMetadata::with_session(""),
            )
            .await;

        assert_eq!(relay.health_check_data().await, snapshot(0, 0));
    }

    #[tokio::test]
    async fn test_disconnect_reports_and_removes() {
        let (relay, mut reports) = relay();
        let conn = alice();
        let metadata = HandshakeMetadata::with_session("abc");

        relay.handle_connect(conn.clone(), &metadata).await;
        let connected = reports.recv().await.unwrap();
        assert_eq!(connected["NotificationReason"], json!("ClientConnected"));

        assert!(relay.handle_disconnect(conn.id(), &metadata).await);

        let disconnected = reports.recv().await.unwrap();
        assert_eq!(
            disconnected,
            json!({ "name": "Alice", "NotificationReason": "ClientDisconnected" })
        );
        assert_eq!(relay.health_check_data().await.total_connected_clients, 0);
    }

    #[tokio::test]
    async fn test_disconnect_before_registration_removes_entry() {
        let (relay, mut reports) = relay();
        let conn = Arc::new(StubConnection::new());
        let metadata = HandshakeMetadata::with_session("abc");

        // Times out after 50ms, leaving the provisional record
        relay.handle_connect(conn.clone(), &metadata).await;
        assert_eq!(relay.registry().len().await, 1);

        assert!(relay.handle_disconnect(conn.id(), &metadata).await);
        assert_eq!(relay.registry().len().await, 0);
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_disconnect_finds_nothing() {
        let (relay, _reports) = relay();
        let conn = alice();
        let metadata = HandshakeMetadata::with_session("abc");

        relay.handle_connect(conn.clone(), &metadata).await;

        assert!(relay.handle_disconnect(conn.id(), &metadata).await);
        assert!(!relay.handle_disconnect(conn.id(), &metadata).await);
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_newer_connection() {
        let (relay, _reports) = relay();
        let metadata = HandshakeMetadata::with_session("abc");
        let old = alice();
        let new = alice();

        relay.handle_connect(old.clone(), &metadata).await;
        relay.handle_connect(new.clone(), &metadata).await;
        assert!(old.was_closed());

        assert!(!relay.handle_disconnect(old.id(), &metadata).await);

        let record = relay
            .registry()
            .get(&SessionId::parse(Some("abc")).unwrap())
            .await
            .unwrap();
        assert_eq!(record.connection_id(), new.id());
        assert_eq!(relay.health_check_data().await.total_connected_clients, 1);
    }

    #[tokio::test]
    async fn test_late_disconnect_spares_reconnected_session() {
        let (relay, _reports) = relay();
        let metadata = HandshakeMetadata::with_session("abc");
        let first = alice();
        let second = alice();
        let third = alice();

        relay.handle_connect(first.clone(), &metadata).await;
        relay.handle_connect(second.clone(), &metadata).await;
        assert!(relay.handle_disconnect(second.id(), &metadata).await);
        relay.handle_connect(third.clone(), &metadata).await;

        // The superseded socket's disconnect finally lands
        assert!(!relay.handle_disconnect(first.id(), &metadata).await);

        let record = relay
            .registry()
            .get(&SessionId::parse(Some("abc")).unwrap())
            .await
            .unwrap();
        assert_eq!(record.connection_id(), third.id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_disconnect_racing_reconnect() {
        let (relay, _reports) = relay();
        let relay = Arc::new(relay);
        let metadata = HandshakeMetadata::with_session("abc");
        let session = SessionId::parse(Some("abc")).unwrap();

        for _ in 0..50 {
            let stale = ConnectionId::new();
            let fresh = alice();

            let disconnect = {
                let relay = relay.clone();
                let metadata = metadata.clone();
                tokio::spawn(async move { relay.handle_disconnect(stale, &metadata).await })
            };
            let connect = {
                let relay = relay.clone();
                let metadata = metadata.clone();
                let fresh = fresh.clone();
                tokio::spawn(async move { relay.handle_connect(fresh, &metadata).await })
            };

            assert!(!disconnect.await.unwrap());
            assert!(connect.await.unwrap().is_registered());

            let record = relay.registry().get(&session).await.unwrap();
            assert_eq!(record.connection_id(), fresh.id());
            assert!(relay.handle_disconnect(fresh.id(), &metadata).await);
        }
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let (relay, _reports) = relay();

        assert!(
            !relay
                .handle_disconnect(ConnectionId::new(), &HandshakeMetadata::default())
                .await
        );
    }

    #[tokio::test]
    async fn test_health_tracks_registry_size() {
        let (relay, _reports) = relay();

        for id in ["a", "b", "c"] {
            relay
                .handle_connect(alice(), &HandshakeMetadata::with_session(id))
                .await;
        }

        let health = relay.health_check_data().await;
        assert_eq!(health.total_connected_clients, relay.registry().len().await);
        assert_eq!(health.total_connected_clients, 3);
    }
}
