use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;

use crate::{auth::AuthError, queue::QueueError};

/// Body of every gateway response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Human-readable outcome.
    pub message: String,
}

impl Message {
    /// Wrap `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failures reported to registration clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The bearer token was missing or unreadable.
    #[error("Failed to authorize: {0}")]
    Unauthorized(#[from] AuthError),
    /// The request body is not a registration request.
    #[error("Registration failed: {0}")]
    InvalidRequest(String),
    /// The job queue could not be reached.
    #[error("Registration failed: {0}")]
    Queue(#[from] QueueError),
    /// A worker reported failure.
    #[error("Failed to register product {url}")]
    RegistrationFailed {
        /// Normalized resource location.
        url: String,
    },
    /// No terminal state was observed within the time limit.
    #[error("Timeout while registering '{url}'")]
    TimedOut {
        /// Normalized resource location.
        url: String,
    },
    /// The waiting task stopped before reporting.
    #[error("Registration failed: {0}")]
    Interrupted(#[from] JoinError),
}

impl GatewayError {
    /// HTTP status reported for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(Message::new(self.to_string()))).into_response()
    }
}
