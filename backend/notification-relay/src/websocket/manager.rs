/// Session Connection Registry
///
/// Maps each session id to the single connection currently serving it.
/// Supports:
/// - Last-writer-wins replacement when a session reconnects
/// - Ownership-checked updates so a superseded connection cannot clobber
///   or remove the entry of the connection that replaced it
/// - Point-in-time size for health reporting
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::ClientConnection;
use crate::metrics;
use crate::models::{ClientContext, ConnectionId, SessionId};

/// Registry entry for one session
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub connection: Arc<dyn ClientConnection>,
    /// Present only once the registration handshake has succeeded
    pub client_context: Option<ClientContext>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Record for a connection that has not completed registration yet
    pub fn provisional(connection: Arc<dyn ClientConnection>) -> Self {
        Self {
            connection,
            client_context: None,
            connected_at: Utc::now(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn is_live(&self) -> bool {
        self.connection.is_connected()
    }
}

/// Concurrency-safe session registry.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<SessionId, ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `session_id`.
    ///
    /// Returns the record that was replaced, if any.
    pub async fn put(
        &self,
        session_id: SessionId,
        record: ConnectionRecord,
    ) -> Option<ConnectionRecord> {
        let mut connections = self.connections.write().await;
        let previous = connections.insert(session_id.clone(), record);
        metrics::set_connected_clients(connections.len());

        tracing::info!(
            session_id = %session_id,
            total_clients = connections.len(),
            "Connection cached"
        );

        previous
    }

    /// Remove the entry for `session_id`, returning whether one existed
    pub async fn remove(&self, session_id: &SessionId) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(session_id).is_some();
        metrics::set_connected_clients(connections.len());

        if removed {
            tracing::info!(
                session_id = %session_id,
                total_clients = connections.len(),
                "Connection removed from registry"
            );
        } else {
            tracing::warn!(session_id = %session_id, "Connection not found in registry");
        }

        removed
    }

    /// Remove the entry only if it still belongs to `connection_id`.
    ///
    /// Check and removal happen under one write lock, so an entry put by a
    /// newer connection in the meantime is never taken out. Returns the
    /// removed record.
    pub async fn remove_if_owned(
        &self,
        session_id: &SessionId,
        connection_id: ConnectionId,
    ) -> Option<ConnectionRecord> {
        let mut connections = self.connections.write().await;

        let owned = connections
            .get(session_id)
            .is_some_and(|record| record.connection_id() == connection_id);
        if !owned {
            return None;
        }

        let removed = connections.remove(session_id);
        metrics::set_connected_clients(connections.len());
        tracing::info!(
            session_id = %session_id,
            connection_id = %connection_id,
            total_clients = connections.len(),
            "Connection removed from registry"
        );

        removed
    }

    /// Attach client context to the entry owned by `connection_id`.
    ///
    /// Returns false if the session is gone or now belongs to another
    /// connection.
    pub async fn attach_context(
        &self,
        session_id: &SessionId,
        connection_id: ConnectionId,
        context: ClientContext,
    ) -> bool {
        let mut connections = self.connections.write().await;

        match connections.get_mut(session_id) {
            Some(record) if record.connection_id() == connection_id => {
                record.client_context = Some(context);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<ConnectionRecord> {
        let connections = self.connections.read().await;
        connections.get(session_id).cloned()
    }

    /// Number of sessions currently registered
    pub async fn len(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    pub(crate) async fn session_ids(&self) -> Vec<SessionId> {
        let connections = self.connections.read().await;
        connections.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::test_support::StubConnection;
    use serde_json::json;

    fn session(id: &str) -> SessionId {
        SessionId::parse(Some(id)).unwrap()
    }

    fn context(name: &str) -> ClientContext {
        serde_json::from_value(json!({ "name": name })).unwrap()
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.len().await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let registry = ConnectionRegistry::new();
        let conn: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());

        let previous = registry
            .put(session("abc"), ConnectionRecord::provisional(conn.clone()))
            .await;

        assert!(previous.is_none());
        let record = registry.get(&session("abc")).await.unwrap();
        assert_eq!(record.connection_id(), conn.id());
        assert!(record.client_context.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_session() {
        let registry = ConnectionRegistry::new();
        let first: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());
        let second: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());

        registry
            .put(session("abc"), ConnectionRecord::provisional(first.clone()))
            .await;
        registry
            .attach_context(&session("abc"), first.id(), context("Alice"))
            .await;
        let previous = registry
            .put(session("abc"), ConnectionRecord::provisional(second.clone()))
            .await
            .unwrap();

        assert_eq!(previous.connection_id(), first.id());
        let current = registry.get(&session("abc")).await.unwrap();
        assert_eq!(current.connection_id(), second.id());
        assert!(current.client_context.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let conn: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());
        registry
            .put(session("abc"), ConnectionRecord::provisional(conn))
            .await;

        assert!(registry.remove(&session("abc")).await);
        assert!(!registry.remove(&session("abc")).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_remove_if_owned_ignores_other_connection() {
        let registry = ConnectionRegistry::new();
        let old: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());
        let new: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());

        registry
            .put(session("abc"), ConnectionRecord::provisional(old.clone()))
            .await;
        registry
            .put(session("abc"), ConnectionRecord::provisional(new.clone()))
            .await;

        assert!(registry
            .remove_if_owned(&session("abc"), old.id())
            .await
            .is_none());
        assert_eq!(registry.len().await, 1);
        let removed = registry
            .remove_if_owned(&session("abc"), new.id())
            .await
            .unwrap();
        assert_eq!(removed.connection_id(), new.id());
        assert_eq!(registry.len().await, 0);
        assert!(registry
            .remove_if_owned(&session("abc"), new.id())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_attach_context_requires_ownership() {
        let registry = ConnectionRegistry::new();
        let old: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());
        let new: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());

        registry
            .put(session("abc"), ConnectionRecord::provisional(old.clone()))
            .await;
        registry
            .put(session("abc"), ConnectionRecord::provisional(new.clone()))
            .await;

        assert!(
            !registry
                .attach_context(&session("abc"), old.id(), context("Stale"))
                .await
        );
        assert!(
            registry
                .attach_context(&session("abc"), new.id(), context("Alice"))
                .await
        );
        assert_eq!(
            registry.get(&session("abc")).await.unwrap().client_context,
            Some(context("Alice"))
        );
        assert!(
            !registry
                .attach_context(&session("missing"), new.id(), context("Bob"))
                .await
        );
    }

    #[tokio::test]
    async fn test_session_ids() {
        let registry = ConnectionRegistry::new();
        for id in ["a", "b", "c"] {
            let conn: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());
            registry
                .put(session(id), ConnectionRecord::provisional(conn))
                .await;
        }

        let mut ids = registry.session_ids().await;
        ids.sort();
        assert_eq!(ids, vec![session("a"), session("b"), session("c")]);
    }

    #[tokio::test]
    async fn test_concurrent_puts_and_removes() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();

        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = session(&format!("s-{}", i % 8));
                let conn: Arc<dyn ClientConnection> = Arc::new(StubConnection::new());
                registry
                    .put(id.clone(), ConnectionRecord::provisional(conn))
                    .await;
                if i % 2 == 0 {
                    registry.remove(&id).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len().await, registry.session_ids().await.len());
        assert!(registry.len().await <= 8);
    }
}
