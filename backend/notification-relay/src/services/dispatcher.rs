/// Notification Dispatcher
///
/// Routes a pushed notification to the live connection of its session.
/// The caller gets an answer as soon as the message has been handed to the
/// connection; the client's acknowledgment arrives later and is only logged.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{RelayError, TransportError};
use crate::metrics;
use crate::models::{DispatchStatus, NotificationMessage, PeerReply, SessionId};
use crate::websocket::{ConnectionRegistry, NOTIFICATION_EVENT};

/// Cumulative dispatch counters
#[derive(Debug, Default)]
pub struct DispatchCounters {
    processed: AtomicU64,
}

impl DispatchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_attempt(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Dispatch attempts so far, successful or not
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }
}

/// How the client answered a pushed notification
pub type AckResult = Result<PeerReply<()>, TransportError>;

/// Result of a dispatch, with a handle on the pending acknowledgment
pub struct DispatchReceipt {
    pub status: DispatchStatus,
    /// Background task processing the client's acknowledgment; `None` when
    /// nothing was sent
    pub ack: Option<JoinHandle<AckResult>>,
}

pub struct NotificationDispatcher {
    registry: ConnectionRegistry,
    counters: Arc<DispatchCounters>,
    request_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        registry: ConnectionRegistry,
        counters: Arc<DispatchCounters>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            counters,
            request_timeout,
        }
    }

    /// Push `message` to its session and report send eligibility
    pub async fn dispatch(&self, message: NotificationMessage) -> DispatchStatus {
        self.dispatch_with_receipt(message).await.status
    }

    pub async fn dispatch_with_receipt(&self, message: NotificationMessage) -> DispatchReceipt {
        self.counters.record_attempt();

        info!(
            session_id = %message.session_id,
            "Received message to push notification"
        );

        let record = match SessionId::parse(Some(message.session_id.as_str())) {
            Ok(session_id) => self
                .registry
                .get(&session_id)
                .await
                .map(|record| (session_id, record)),
            Err(_) => None,
        };

        let (session_id, record) = match record {
            Some(found) => found,
            None => {
                let err = RelayError::DispatchTargetMissing(message.session_id.clone());
                error!("Connection could not be retrieved from the registry: {}", err);
                return Self::failed();
            }
        };

        if !record.is_live() {
            let err = RelayError::DispatchTargetMissing(message.session_id.clone());
            error!(
                connection_id = %record.connection_id(),
                "Notification cannot be pushed as the connection is not in connected state: {}",
                err
            );
            return Self::failed();
        }

        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to encode notification");
                return Self::failed();
            }
        };

        info!(
            session_id = %session_id,
            connection_id = %record.connection_id(),
            "Connection found, pushing notification"
        );

        let connection = record.connection;
        let timeout = self.request_timeout;
        let ack = tokio::spawn(async move {
            let result = connection
                .request(NOTIFICATION_EVENT, payload, timeout)
                .await
                .map(PeerReply::from_ack);
            log_ack(&session_id, &result);
            result
        });

        metrics::record_dispatch(DispatchStatus::Delivered.code());
        DispatchReceipt {
            status: DispatchStatus::Delivered,
            ack: Some(ack),
        }
    }

    fn failed() -> DispatchReceipt {
        metrics::record_dispatch(DispatchStatus::Failed.code());
        DispatchReceipt {
            status: DispatchStatus::Failed,
            ack: None,
        }
    }
}

fn log_ack(session_id: &SessionId, result: &AckResult) {
    let reason = match result {
        Ok(PeerReply::Accepted(())) => {
            info!(session_id = %session_id, "Notification push successful, received ACK from client");
            metrics::record_ack("acknowledged");
            return;
        }
        Ok(PeerReply::Rejected(status)) => {
            metrics::record_ack("rejected");
            format!("client answered with status {status}")
        }
        Ok(PeerReply::Missing) => {
            metrics::record_ack("missing");
            "acknowledgment data is undefined".to_string()
        }
        Err(e) => {
            metrics::record_ack("transport_error");
            e.to_string()
        }
    };

    let err = RelayError::DeliveryUnacknowledged {
        session_id: session_id.clone(),
        reason,
    };
    error!(session_id = %session_id, "Error while pushing notification to client: {}", err);
}
