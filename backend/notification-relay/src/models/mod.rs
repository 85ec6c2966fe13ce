use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::RelayError;

/// Client-supplied session token, trimmed and guaranteed non-blank
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parse a raw session id as received from the transport handshake.
    ///
    /// Missing, empty and whitespace-only values are rejected.
    pub fn parse(raw: Option<&str>) -> Result<Self, RelayError> {
        match raw.map(str::trim) {
            Some(value) if !value.is_empty() => Ok(Self(value.to_string())),
            _ => Err(RelayError::InvalidSession),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one physical connection, as opposed to the logical session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Metadata captured from the transport when a connection is opened
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeMetadata {
    #[serde(rename = "sessionID")]
    pub session_id: Option<String>,
}

impl HandshakeMetadata {
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
        }
    }
}

/// Context the client reports about itself during registration
/// (client name, agent id, extension, workstation address, status, ...).
///
/// Kept as an open JSON object so that fields unknown to the relay are
/// forwarded to the status endpoint untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientContext(Map<String, Value>);

impl ClientContext {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Copy of this context tagged with the reason it is being reported
    pub fn with_reason(&self, reason: NotificationReason) -> Self {
        let mut fields = self.0.clone();
        fields.insert(
            "NotificationReason".to_string(),
            Value::String(reason.as_str().to_string()),
        );
        Self(fields)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ClientContext {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Connectivity change reported to the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationReason {
    ClientConnected,
    ClientDisconnected,
}

impl NotificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationReason::ClientConnected => "ClientConnected",
            NotificationReason::ClientDisconnected => "ClientDisconnected",
        }
    }
}

/// Notification pushed by the trigger surface to one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    #[serde(rename = "notificationMessageType", default)]
    pub message_type: Option<String>,
    #[serde(rename = "notificationMessage", default)]
    pub message: Option<String>,
    #[serde(rename = "notificationMessageContext", default)]
    pub context: Option<Value>,
}

impl NotificationMessage {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message_type: None,
            message: Some(message.into()),
            context: None,
        }
    }
}

/// Caller-visible outcome of a dispatch.
///
/// `Delivered` only means the target connection was found live and the
/// message was handed to it; the peer's acknowledgment is processed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Delivered,
    Failed,
}

impl DispatchStatus {
    pub fn code(&self) -> u16 {
        match self {
            DispatchStatus::Delivered => 200,
            DispatchStatus::Failed => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchStatus::Delivered)
    }
}

/// Read-only health aggregate served by the trigger surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub total_connected_clients: usize,
    pub notifications_pushed: u64,
}

/// Interpreted response to a request/acknowledge exchange.
///
/// Separates the three outcomes a peer can produce: a 200 response carrying
/// the expected payload, an explicit non-200 status, or no usable data.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerReply<T> {
    Accepted(T),
    Rejected(u16),
    Missing,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    status: Option<u16>,
    #[serde(rename = "clientContext")]
    client_context: Option<Map<String, Value>>,
}

fn parse_raw(data: Option<Value>) -> Option<RawReply> {
    match data {
        None | Some(Value::Null) => None,
        Some(value) => serde_json::from_value(value).ok(),
    }
}

impl PeerReply<ClientContext> {
    /// Interpret the response to a `registerClient` request.
    ///
    /// A 200 without a `clientContext` object counts as missing data.
    pub fn from_registration(data: Option<Value>) -> Self {
        match parse_raw(data) {
            Some(RawReply {
                status: Some(200),
                client_context: Some(fields),
            }) => PeerReply::Accepted(ClientContext::new(fields)),
            Some(RawReply {
                status: Some(200), ..
            }) => PeerReply::Missing,
            Some(RawReply {
                status: Some(status),
                ..
            }) => PeerReply::Rejected(status),
            _ => PeerReply::Missing,
        }
    }
}

impl PeerReply<()> {
    /// Interpret the acknowledgment of a `notificationMessage` request
    pub fn from_ack(data: Option<Value>) -> Self {
        match parse_raw(data) {
            Some(RawReply {
                status: Some(200), ..
            }) => PeerReply::Accepted(()),
            Some(RawReply {
                status: Some(status),
                ..
            }) => PeerReply::Rejected(status),
            _ => PeerReply::Missing,
        }
    }
}
