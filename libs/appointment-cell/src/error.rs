use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::AppointmentStatus;

use crate::models::TransitionAction;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Slot {slot_id} is no longer available")]
    SlotUnavailable { slot_id: Uuid },

    #[error("Cannot {action} appointment {appointment_id} while it is {current}")]
    InvalidTransition {
        appointment_id: Uuid,
        current: AppointmentStatus,
        action: TransitionAction,
    },

    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotUnavailable { slot_id } => AppError::SlotUnavailable { slot_id },
            BookingError::InvalidTransition {
                appointment_id,
                current,
                action,
            } => AppError::InvalidTransition {
                appointment_id,
                current,
                action: action.to_string(),
            },
            BookingError::SlotNotFound(id) => AppError::NotFound(format!("Slot {} not found", id)),
            BookingError::AppointmentNotFound(id) => {
                AppError::NotFound(format!("Appointment {} not found", id))
            }
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::Storage(StoreError::Unavailable(message)) => AppError::Persistence {
                message,
                retryable: true,
            },
            BookingError::Storage(other) => {
                error!("Unexpected storage failure on booking path: {}", other);
                AppError::Persistence {
                    message: other.to_string(),
                    retryable: false,
                }
            }
        }
    }
}
