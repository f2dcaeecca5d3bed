// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::Appointment;
use shared_utils::access::{ensure_owner_access, ensure_patient_access, require_patient};

use crate::models::{AppointmentView, BookAppointmentRequest, TransitionAction};
use crate::services::{BookingStateMachine, NotificationPublisher};

/// Shared state for the appointment routes.
pub struct BookingState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub publisher: NotificationPublisher,
}

impl BookingState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn SchedulingStore>,
        publisher: NotificationPublisher,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            publisher,
        })
    }

    pub fn machine(&self) -> BookingStateMachine {
        BookingStateMachine::new(self.store.clone(), self.publisher.clone(), &self.config.scheduling)
    }
}

fn view(machine: &BookingStateMachine, appointment: &Appointment) -> Value {
    let actions = machine.lifecycle().available_actions(appointment.status);
    json!(AppointmentView::new(appointment, actions))
}

/// Providers act on appointments in their own calendar; patients may only
/// cancel their own.
fn authorize_transition(user: &User, appointment: &Appointment, action: TransitionAction) -> Result<(), AppError> {
    let as_provider = ensure_owner_access(user, &appointment.owner);
    match action {
        TransitionAction::Cancel if as_provider.is_err() => {
            ensure_patient_access(user, appointment.patient_id)
        }
        _ => as_provider,
    }
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = require_patient(&user)?;
    let patient_id = request.patient_id.unwrap_or(caller);
    ensure_patient_access(&user, patient_id)?;

    let machine = state.machine();
    let appointment = machine
        .book(request.slot_id, patient_id, &request.reason, request.notes)
        .await?;

    Ok((StatusCode::CREATED, Json(view(&machine, &appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let machine = state.machine();
    let appointment = machine.get(appointment_id).await?;

    ensure_owner_access(&user, &appointment.owner)
        .or_else(|_| ensure_patient_access(&user, appointment.patient_id))?;

    Ok(Json(view(&machine, &appointment)))
}

// ==============================================================================
// TRANSITIONS
// ==============================================================================

async fn run_transition(
    state: &BookingState,
    user: &User,
    appointment_id: Uuid,
    action: TransitionAction,
) -> Result<Json<Value>, AppError> {
    let machine = state.machine();
    let appointment = machine.get(appointment_id).await?;
    authorize_transition(user, &appointment, action)?;

    debug!("User {} requests {} on appointment {}", user.id, action, appointment_id);
    let updated = machine.transition(appointment_id, action).await?;

    Ok(Json(view(&machine, &updated)))
}

#[axum::debug_handler]
pub async fn accept_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    run_transition(&state, &user, appointment_id, TransitionAction::Accept).await
}

#[axum::debug_handler]
pub async fn decline_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    run_transition(&state, &user, appointment_id, TransitionAction::Decline).await
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    run_transition(&state, &user, appointment_id, TransitionAction::Cancel).await
}

#[axum::debug_handler]
pub async fn reopen_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    run_transition(&state, &user, appointment_id, TransitionAction::Reopen).await
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    run_transition(&state, &user, appointment_id, TransitionAction::Complete).await
}
