/// Registration Handshake
///
/// Runs once for every new connection:
///
/// ```text
/// Connected ──(blank session id)──────────────────────────────► Failed
/// Connected ──► AwaitingRegistration ──(200 + clientContext)──► Registered
///                                    └─(other status / no data)► Failed
/// ```
///
/// A failed handshake leaves the provisional record in the registry: the
/// session stays dispatchable, it just carries no client context.
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::StatusNotifier;
use crate::error::{RelayError, TransportError};
use crate::metrics;
use crate::models::{ClientContext, HandshakeMetadata, NotificationReason, PeerReply, SessionId};
use crate::websocket::{ClientConnection, ConnectionRecord, ConnectionRegistry, REGISTER_CLIENT_EVENT};

/// Why a handshake did not reach `Registered`
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationFailure {
    /// Missing or blank session id; nothing was registered
    InvalidSession,
    /// Client answered with a status other than 200
    Rejected(u16),
    /// Client answered without usable data
    MissingData,
    /// No answer: the connection dropped or the request timed out
    Transport(TransportError),
    /// A newer connection took over the session while this one was
    /// waiting for its answer
    Superseded,
}

impl RegistrationFailure {
    fn label(&self) -> &'static str {
        match self {
            RegistrationFailure::InvalidSession => "invalid_session",
            RegistrationFailure::Rejected(_) => "rejected",
            RegistrationFailure::MissingData => "missing_data",
            RegistrationFailure::Transport(TransportError::Timeout(_)) => "timeout",
            RegistrationFailure::Transport(_) => "transport_error",
            RegistrationFailure::Superseded => "superseded",
        }
    }

    fn describe(&self) -> String {
        match self {
            RegistrationFailure::InvalidSession => "session id is missing or blank".to_string(),
            RegistrationFailure::Rejected(status) => format!("status code: {status}"),
            RegistrationFailure::MissingData => "callback data is undefined".to_string(),
            RegistrationFailure::Transport(e) => e.to_string(),
            RegistrationFailure::Superseded => {
                "session was taken over by a newer connection".to_string()
            }
        }
    }
}

/// Terminal state of a handshake
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered(ClientContext),
    Failed(RegistrationFailure),
}

impl RegistrationOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationOutcome::Registered(_))
    }
}

pub struct RegistrationHandshake {
    registry: ConnectionRegistry,
    notifier: StatusNotifier,
    request_timeout: Duration,
}

impl RegistrationHandshake {
    pub fn new(
        registry: ConnectionRegistry,
        notifier: StatusNotifier,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            notifier,
            request_timeout,
        }
    }

    /// Register `connection` and ask the client for its context.
    ///
    /// Attempted exactly once; there is no retry.
    pub async fn run(
        &self,
        connection: Arc<dyn ClientConnection>,
        metadata: &HandshakeMetadata,
    ) -> RegistrationOutcome {
        let connection_id = connection.id();

        let session_id = match SessionId::parse(metadata.session_id.as_deref()) {
            Ok(session_id) => session_id,
            Err(e) => {
                warn!(connection_id = %connection_id, "Socket established with empty session id: {}", e);
                // Leave the socket open; closing it is the transport's call
                return self.failed(None, RegistrationFailure::InvalidSession);
            }
        };

        info!(
            session_id = %session_id,
            connection_id = %connection_id,
            "+++ New connection established"
        );

        let superseded = self
            .registry
            .put(
                session_id.clone(),
                ConnectionRecord::provisional(connection.clone()),
            )
            .await;

        if let Some(previous) = superseded {
            if previous.connection_id() != connection_id {
                info!(
                    session_id = %session_id,
                    previous_connection_id = %previous.connection_id(),
                    connection_id = %connection_id,
                    "Closing connection superseded by reconnect"
                );
                previous.connection.close();
            }
        }

        debug!(session_id = %session_id, state = "AwaitingRegistration", "Requesting client registration");

        let payload = json!({
            "sessionID": session_id,
            "socketID": connection_id,
        });

        let reply = match connection
            .request(REGISTER_CLIENT_EVENT, payload, self.request_timeout)
            .await
        {
            Ok(data) => PeerReply::from_registration(data),
            Err(e) => return self.failed(Some(&session_id), RegistrationFailure::Transport(e)),
        };

        match reply {
            PeerReply::Accepted(context) => {
                let attached = self
                    .registry
                    .attach_context(&session_id, connection_id, context.clone())
                    .await;
                if !attached {
                    return self.failed(Some(&session_id), RegistrationFailure::Superseded);
                }

                info!(session_id = %session_id, state = "Registered", "Client registered");
                metrics::record_registration("registered");
                self.notifier
                    .notify(NotificationReason::ClientConnected, &session_id, Some(&context));

                RegistrationOutcome::Registered(context)
            }
            PeerReply::Rejected(status) => {
                self.failed(Some(&session_id), RegistrationFailure::Rejected(status))
            }
            PeerReply::Missing => self.failed(Some(&session_id), RegistrationFailure::MissingData),
        }
    }

    fn failed(
        &self,
        session_id: Option<&SessionId>,
        failure: RegistrationFailure,
    ) -> RegistrationOutcome {
        metrics::record_registration(failure.label());

        if let Some(session_id) = session_id {
            let err = RelayError::RegistrationFailed {
                session_id: session_id.clone(),
                reason: failure.describe(),
            };
            warn!(session_id = %session_id, state = "Failed", "{}", err);
        }

        RegistrationOutcome::Failed(failure)
    }
}
