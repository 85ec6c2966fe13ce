#![allow(dead_code)]

use async_trait::async_trait;
use notification_relay::error::{RelayError, TransportError};
use notification_relay::models::ConnectionId;
use notification_relay::services::{StatusReportResponse, StatusReporter};
use notification_relay::ClientConnection;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Client double that answers requests from a queue of scripted replies.
/// An empty queue behaves like a client that never acknowledges.
#[derive(Debug)]
pub struct ScriptedClient {
    id: ConnectionId,
    replies: Mutex<VecDeque<Option<Value>>>,
    received: Mutex<Vec<(String, Value)>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Option<Value>>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            replies: Mutex::new(replies.into()),
            received: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn received(&self) -> Vec<(String, Value)> {
        self.received.lock().unwrap().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientConnection for ScriptedClient {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn request(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        self.received
            .lock()
            .unwrap()
            .push((event.to_string(), payload));

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Status endpoint double; every report lands on the returned channel
pub struct ChannelReporter {
    reports: mpsc::UnboundedSender<Value>,
}

impl ChannelReporter {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { reports: tx }), rx)
    }
}

#[async_trait]
impl StatusReporter for ChannelReporter {
    async fn report(&self, body: Value) -> Result<StatusReportResponse, RelayError> {
        let _ = self.reports.send(body);
        Ok(StatusReportResponse {
            status: 200,
            body: "OK".to_string(),
        })
    }
}

pub fn registration_reply(context: Value) -> Option<Value> {
    Some(serde_json::json!({ "status": 200, "clientContext": context }))
}

pub fn ack(status: u16) -> Option<Value> {
    Some(serde_json::json!({ "status": status }))
}
