use actix::{Message, Recipient};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

use super::messages::WsFrame;
use crate::error::TransportError;
use crate::models::ConnectionId;

/// What the relay core needs from a live client connection.
///
/// The core never touches sockets directly; it only issues correlated
/// requests, checks liveness and, when a session is taken over by a newer
/// connection, closes the old one.
#[async_trait]
pub trait ClientConnection: Send + Sync + fmt::Debug {
    fn id(&self) -> ConnectionId;

    fn is_connected(&self) -> bool;

    /// Send `event` with `payload` and wait for the peer's single response.
    ///
    /// Resolves to `Ok(None)` when the peer acknowledged without data.
    async fn request(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError>;

    fn close(&self);
}

/// Commands delivered to the WebSocket actor that owns the socket
#[derive(Debug, Message)]
#[rtype(result = "()")]
pub enum ConnectionCommand {
    Send(String),
    Close,
}

/// `ClientConnection` backed by a WebSocket session actor
pub struct WsConnection {
    id: ConnectionId,
    outbound: Recipient<ConnectionCommand>,
    pending: DashMap<u64, oneshot::Sender<Option<Value>>>,
    next_request_id: AtomicU64,
    open: AtomicBool,
}

impl WsConnection {
    pub fn new(id: ConnectionId, outbound: Recipient<ConnectionCommand>) -> Self {
        Self {
            id,
            outbound,
            pending: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            open: AtomicBool::new(true),
        }
    }

    /// Hand an acknowledgment to the request waiting on `request_id`.
    ///
    /// Returns false when nobody is waiting (unknown id, or the request
    /// already timed out).
    pub fn resolve(&self, request_id: u64, payload: Option<Value>) -> bool {
        match self.pending.remove(&request_id) {
            Some((_, waiter)) => waiter.send(payload).is_ok(),
            None => false,
        }
    }

    /// Mark the connection closed and fail every outstanding request
    pub fn shutdown(&self) {
        self.open.store(false, Ordering::SeqCst);
        // Dropping the senders wakes the waiters with a receive error
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

impl fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("open", &self.open.load(Ordering::SeqCst))
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[async_trait]
impl ClientConnection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.outbound.connected()
    }

    async fn request(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = WsFrame::request(request_id, event, payload).to_json()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);

        // `send` waits for mailbox room; only a stopped actor fails it
        let exchange = async {
            self.outbound
                .send(ConnectionCommand::Send(frame))
                .await
                .map_err(|_| TransportError::Disconnected)?;
            rx.await.map_err(|_| TransportError::Disconnected)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(err)) => {
                self.pending.remove(&request_id);
                Err(err)
            }
            Err(_) => {
                self.pending.remove(&request_id);
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    fn close(&self) {
        if self.open.load(Ordering::SeqCst) {
            self.outbound.do_send(ConnectionCommand::Close);
        }
    }
}
