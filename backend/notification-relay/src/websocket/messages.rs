/// WebSocket frame types for the request/acknowledge protocol
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event asking a freshly connected client for its context
pub const REGISTER_CLIENT_EVENT: &str = "registerClient";

/// Event carrying a pushed notification
pub const NOTIFICATION_EVENT: &str = "notificationMessage";

/// Frames exchanged over a relay WebSocket.
///
/// Every `Request` sent by the server is answered by exactly one `Ack`
/// from the client carrying the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsFrame {
    /// Server asks the client to handle an event and acknowledge it
    Request {
        id: u64,
        event: String,
        payload: Value,
    },

    /// Client answers a request; `payload` is absent when the client
    /// acknowledged without data
    Ack {
        id: u64,
        #[serde(default)]
        payload: Option<Value>,
    },
}

impl WsFrame {
    pub fn request(id: u64, event: impl Into<String>, payload: Value) -> Self {
        WsFrame::Request {
            id,
            event: event.into(),
            payload,
        }
    }

    #[cfg(test)]
    pub(crate) fn ack(id: u64, payload: Option<Value>) -> Self {
        WsFrame::Ack { id, payload }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
