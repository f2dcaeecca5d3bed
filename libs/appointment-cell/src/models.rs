use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus, OwnerKind};

// ==============================================================================
// TRANSITIONS
// ==============================================================================

/// Caller-facing operations on an existing appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Accept,
    Decline,
    Cancel,
    Reopen,
    Complete,
}

impl TransitionAction {
    pub const ALL: [TransitionAction; 5] = [
        TransitionAction::Accept,
        TransitionAction::Decline,
        TransitionAction::Cancel,
        TransitionAction::Reopen,
        TransitionAction::Complete,
    ];

    /// Status the appointment ends up in when the action succeeds.
    pub fn target(&self) -> AppointmentStatus {
        match self {
            TransitionAction::Accept => AppointmentStatus::Accepted,
            TransitionAction::Decline => AppointmentStatus::Declined,
            TransitionAction::Cancel => AppointmentStatus::Cancelled,
            TransitionAction::Reopen => AppointmentStatus::Pending,
            TransitionAction::Complete => AppointmentStatus::Completed,
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionAction::Accept => "accept",
            TransitionAction::Decline => "decline",
            TransitionAction::Cancel => "cancel",
            TransitionAction::Reopen => "reopen",
            TransitionAction::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub slot_id: Uuid,
    /// Only admins may book on behalf of another patient.
    pub patient_id: Option<Uuid>,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub owner_id: Uuid,
    pub owner_kind: OwnerKind,
    pub patient_id: Uuid,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub available_actions: Vec<TransitionAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentView {
    pub fn new(appointment: &Appointment, available_actions: Vec<TransitionAction>) -> Self {
        Self {
            id: appointment.id,
            slot_id: appointment.slot_id,
            owner_id: appointment.owner.id,
            owner_kind: appointment.owner.kind,
            patient_id: appointment.patient_id,
            status: appointment.status,
            reason: appointment.reason.clone(),
            notes: appointment.notes.clone(),
            available_actions,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        }
    }
}
