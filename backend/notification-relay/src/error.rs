use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::models::SessionId;

pub type Result<T> = std::result::Result<T, AppError>;

/// Process-level errors: configuration, startup and the HTTP surface
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": "false",
            "error": self.to_string()
        }))
    }
}

/// Failures inside the relay core.
///
/// None of these escape to the process; they are logged where they happen
/// and callers only ever observe a dispatch status or a health snapshot.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("session id is missing or blank")]
    InvalidSession,

    #[error("registration failed for session {session_id}: {reason}")]
    RegistrationFailed {
        session_id: SessionId,
        reason: String,
    },

    #[error("no live connection for session {0}")]
    DispatchTargetMissing(String),

    #[error("notification to session {session_id} was not acknowledged: {reason}")]
    DeliveryUnacknowledged {
        session_id: SessionId,
        reason: String,
    },

    #[error("failed to report client status: {0}")]
    StatusReportFailure(String),
}

/// Failures of a single request/acknowledge exchange on a connection
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("connection is closed")]
    Disconnected,

    #[error("no response from peer within {0:?}")]
    Timeout(Duration),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Encode(e.to_string())
    }
}
