//! Error types for the relay.
//!
//! Every failure maps to one wire [`ErrorCode`]: HTTP handlers render it as
//! `{"error": {"code", "message"}}`, WebSocket handlers as an `error` message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use hyperspace_core::{InboxError, ValidationError};
use hyperspace_store::StoreError;
use hyperspace_sync::{ErrorCode, Response, SyncError};

/// Errors that can occur while serving a request.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An event failed the reducer.
    #[error(transparent)]
    Event(#[from] ValidationError),

    /// An inbox post violated the inbox policy.
    #[error(transparent)]
    Inbox(#[from] InboxError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Malformed or oversized frame.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Malformed input outside the event reducer.
    #[error("{0}")]
    Validation(String),

    /// Missing, expired or invalid credentials or signatures.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, ServerError>;

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::Event(e) => match e {
                ValidationError::ChainConflict { .. } => ErrorCode::ChainConflict,
                ValidationError::SignatureFailed => ErrorCode::Unauthorized,
                ValidationError::NotAMember(_)
                | ValidationError::AuthorKeyMismatch(_)
                | ValidationError::NoInvitation(_) => ErrorCode::Forbidden,
                _ => ErrorCode::Validation,
            },
            ServerError::Inbox(InboxError::PolicyViolation(_)) => ErrorCode::Validation,
            ServerError::Inbox(InboxError::InvalidSignature) => ErrorCode::Unauthorized,
            ServerError::Store(StoreError::NotFound(_)) => ErrorCode::NotFound,
            ServerError::Store(StoreError::AlreadyExists(_)) => ErrorCode::Validation,
            ServerError::Store(_) => ErrorCode::Database,
            ServerError::Sync(_) | ServerError::Validation(_) | ServerError::Conflict(_) => {
                ErrorCode::Validation
            }
            ServerError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServerError::Forbidden(_) => ErrorCode::Forbidden,
            ServerError::NotFound(_) => ErrorCode::NotFound,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Conflict(_) | ServerError::Store(StoreError::AlreadyExists(_)) => {
                StatusCode::CONFLICT
            }
            _ => match self.code() {
                ErrorCode::Validation => StatusCode::BAD_REQUEST,
                ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorCode::Forbidden => StatusCode::FORBIDDEN,
                ErrorCode::NotFound => StatusCode::NOT_FOUND,
                ErrorCode::ChainConflict => StatusCode::CONFLICT,
                ErrorCode::Database => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// The `error` message sent over a WebSocket.
    pub fn to_wire(&self) -> Response {
        Response::error(self.code(), self.public_message())
    }

    /// Storage internals are logged, not shown.
    fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::Database => "internal storage error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Log with the operation that failed. Storage failures are errors,
    /// everything else is the client's problem.
    pub fn log(&self, operation: &str) {
        if self.code() == ErrorCode::Database {
            tracing::error!(operation, error = %self, "database error");
        } else {
            tracing::debug!(operation, error = %self, "request rejected");
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> HttpResponse {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}
