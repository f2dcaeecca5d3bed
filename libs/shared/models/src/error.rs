use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::scheduling::AppointmentStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid pattern ({field}): {reason}")]
    InvalidPattern { field: String, reason: String },

    #[error("Slot {slot_id} is no longer available")]
    SlotUnavailable { slot_id: Uuid },

    #[error("Cannot {action} appointment {appointment_id} while it is {current}")]
    InvalidTransition {
        appointment_id: Uuid,
        current: AppointmentStatus,
        action: String,
    },

    #[error("Persistence error: {message}")]
    Persistence { message: String, retryable: bool },

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidPattern { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SlotUnavailable { .. }
            | AppError::InvalidTransition { .. }
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidPattern { .. } => "INVALID_PATTERN",
            AppError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Persistence { .. } => "PERSISTENCE_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// Structured fields a client needs to react without parsing the message.
    pub fn details(&self) -> Value {
        match self {
            AppError::InvalidPattern { field, reason } => json!({
                "field": field,
                "reason": reason,
            }),
            AppError::SlotUnavailable { slot_id } => json!({
                "slotId": slot_id,
                "hint": "refresh availability and choose another slot",
            }),
            AppError::InvalidTransition { appointment_id, current, action } => json!({
                "appointmentId": appointment_id,
                "currentStatus": current,
                "action": action,
            }),
            AppError::Persistence { retryable, .. } => json!({
                "retryable": retryable,
            }),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        // Lost races and stale transitions are steady-state outcomes, not bugs.
        match &self {
            AppError::SlotUnavailable { .. } | AppError::InvalidTransition { .. } => {
                tracing::info!("Request rejected: {}: {}", status, message);
            }
            AppError::Internal(_) | AppError::Persistence { .. } => {
                tracing::error!("Error: {}: {}", status, message);
            }
            _ => {
                tracing::debug!("Request rejected: {}: {}", status, message);
            }
        }

        let mut body = json!({
            "error": message,
            "code": self.code(),
        });
        let details = self.details();
        if !details.is_null() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}
