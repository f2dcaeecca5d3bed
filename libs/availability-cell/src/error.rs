use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Invalid pattern ({field}): {reason}")]
    InvalidPattern { field: &'static str, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid page cursor")]
    InvalidCursor,

    #[error("Could not encode page cursor: {0}")]
    CursorEncoding(String),

    #[error("Slot pattern not found: {0}")]
    PatternNotFound(Uuid),

    #[error("Slots kept overlapping a concurrent materialization after {attempts} attempts")]
    MaterializationContention { attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AvailabilityError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        AvailabilityError::InvalidPattern {
            field,
            reason: reason.into(),
        }
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidPattern { field, reason } => AppError::InvalidPattern {
                field: field.to_string(),
                reason,
            },
            AvailabilityError::InvalidQuery(msg) => AppError::BadRequest(msg),
            AvailabilityError::InvalidCursor => AppError::BadRequest("Invalid page cursor".to_string()),
            AvailabilityError::CursorEncoding(msg) => {
                error!("Failed to encode page cursor: {}", msg);
                AppError::Internal("Could not build the next page cursor".to_string())
            }
            AvailabilityError::PatternNotFound(id) => {
                AppError::NotFound(format!("Slot pattern {} not found", id))
            }
            AvailabilityError::MaterializationContention { attempts } => AppError::Conflict(format!(
                "Slots kept overlapping a concurrent materialization after {} attempts",
                attempts
            )),
            AvailabilityError::Storage(store_err) => match store_err {
                StoreError::Unavailable(message) => AppError::Persistence {
                    message,
                    retryable: true,
                },
                StoreError::NotFound { entity, id } => {
                    AppError::NotFound(format!("{} {} not found", entity, id))
                }
                other => {
                    error!("Unexpected storage failure on availability path: {}", other);
                    AppError::Persistence {
                        message: other.to_string(),
                        retryable: false,
                    }
                }
            },
        }
    }
}
