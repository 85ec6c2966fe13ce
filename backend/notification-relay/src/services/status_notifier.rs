/// Client Status Notifier
///
/// Reports connect/disconnect events to the external status endpoint.
/// Reports are fire-and-forget: outcomes are logged and counted, never
/// returned to the connection lifecycle.
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::StatusEndpointConfig;
use crate::error::{AppError, RelayError};
use crate::metrics;
use crate::models::{ClientContext, NotificationReason, SessionId};

/// Response from the status endpoint, kept for logging only
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReportResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound channel for status reports
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, body: Value) -> Result<StatusReportResponse, RelayError>;
}

/// `StatusReporter` that sends the report as JSON over HTTP
pub struct HttpStatusReporter {
    client: reqwest::Client,
    url: String,
    method: reqwest::Method,
}

impl HttpStatusReporter {
    pub fn new(config: &StatusEndpointConfig) -> Result<Self, AppError> {
        let method = reqwest::Method::from_bytes(config.method.as_bytes())
            .map_err(|e| AppError::Config(format!("STATUS_ENDPOINT_METHOD: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("status endpoint client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            method,
        })
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, body: Value) -> Result<StatusReportResponse, RelayError> {
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::StatusReportFailure(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::StatusReportFailure(e.to_string()))?;

        Ok(StatusReportResponse { status, body })
    }
}

#[derive(Clone)]
pub struct StatusNotifier {
    reporter: Arc<dyn StatusReporter>,
}

impl StatusNotifier {
    pub fn new(reporter: Arc<dyn StatusReporter>) -> Self {
        Self { reporter }
    }

    /// Report `reason` for a session on a background task.
    ///
    /// Without a client context there is nothing to report; the call logs
    /// an error and returns `None`.
    pub fn notify(
        &self,
        reason: NotificationReason,
        session_id: &SessionId,
        context: Option<&ClientContext>,
    ) -> Option<JoinHandle<()>> {
        let Some(context) = context else {
            error!(
                session_id = %session_id,
                reason = reason.as_str(),
                "Cannot report client status: client context is undefined"
            );
            metrics::record_status_report(reason.as_str(), "skipped");
            return None;
        };

        let body = match serde_json::to_value(context.with_reason(reason)) {
            Ok(body) => body,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to serialize client status");
                return None;
            }
        };

        info!(
            session_id = %session_id,
            body = %body,
            "Posting client status"
        );

        let reporter = self.reporter.clone();
        let session_id = session_id.clone();
        Some(tokio::spawn(async move {
            match reporter.report(body).await {
                Ok(response) => {
                    info!(
                        session_id = %session_id,
                        status = response.status,
                        body = %response.body,
                        "Client status reported"
                    );
                    metrics::record_status_report(reason.as_str(), "sent");
                }
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Error reporting client status");
                    metrics::record_status_report(reason.as_str(), "failed");
                }
            }
        }))
    }
}
