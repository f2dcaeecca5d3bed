// libs/appointment-cell/tests/handlers_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use uuid::Uuid;

use appointment_cell::handlers::*;
use appointment_cell::{BookAppointmentRequest, NotificationPublisher};
use availability_cell::{AvailabilityIndex, PatternSpec, SlotMaterializer};
use shared_database::{InMemorySchedulingStore, SchedulingStore};
use shared_models::error::AppError;
use shared_models::{AppointmentMedium, AppointmentStatus, Frequency};
use shared_utils::test_utils::{TestConfig, TestUser};

struct Fixture {
    state: Arc<BookingState>,
    doctor: TestUser,
    slot_id: Uuid,
}

async fn fixture() -> Fixture {
    let config = TestConfig::default().to_arc();
    let store: Arc<dyn SchedulingStore> = Arc::new(InMemorySchedulingStore::new());
    let doctor = TestUser::doctor();
    let day = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();

    SlotMaterializer::new(store.clone(), &config.scheduling)
        .materialize(
            doctor.owner(),
            &PatternSpec {
                weekdays: vec!["Mon".to_string()],
                frequency: Frequency::Weekly,
                start_date: day,
                end_date: None,
                start_time: "14:00".to_string(),
                end_time: "14:45".to_string(),
                duration_minutes: None,
            },
            AppointmentMedium::InPerson,
            None,
        )
        .await
        .unwrap();

    let slots = AvailabilityIndex::new(store.clone(), &config.scheduling)
        .slots_for_date(doctor.id, day)
        .await
        .unwrap();
    assert_eq!(slots.len(), 1);

    Fixture {
        state: BookingState::new(config, store, NotificationPublisher::default()),
        doctor,
        slot_id: slots[0].id,
    }
}

fn request(slot_id: Uuid) -> BookAppointmentRequest {
    BookAppointmentRequest {
        slot_id,
        patient_id: None,
        reason: "Persistent headache".to_string(),
        notes: None,
    }
}

async fn book_as(f: &Fixture, patient: &TestUser) -> Uuid {
    let (status, Json(body)) = book_appointment(State(f.state.clone()), patient.extension(), Json(request(f.slot_id)))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    serde_json::from_value(body["id"].clone()).unwrap()
}

#[tokio::test]
async fn test_patient_books_slot() {
    let f = fixture().await;
    let patient = TestUser::patient();

    let (status, Json(body)) = book_appointment(State(f.state.clone()), patient.extension(), Json(request(f.slot_id)))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["patientId"], patient.id.to_string());
    assert_eq!(body["ownerId"], f.doctor.id.to_string());
    assert_eq!(body["availableActions"], serde_json::json!(["accept", "decline", "cancel"]));

    let other = TestUser::patient();
    let result = book_appointment(State(f.state.clone()), other.extension(), Json(request(f.slot_id))).await;
    assert_matches!(result, Err(AppError::SlotUnavailable { slot_id }) if slot_id == f.slot_id);
}

#[tokio::test]
async fn test_booking_rules_for_callers() {
    let f = fixture().await;

    let result = book_appointment(State(f.state.clone()), f.doctor.extension(), Json(request(f.slot_id))).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let patient = TestUser::patient();
    let mut on_behalf = request(f.slot_id);
    on_behalf.patient_id = Some(Uuid::new_v4());
    let result = book_appointment(State(f.state.clone()), patient.extension(), Json(on_behalf)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let result = book_appointment(State(f.state.clone()), patient.extension(), Json(request(Uuid::new_v4()))).await;
    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn test_owner_accepts_and_others_cannot() {
    let f = fixture().await;
    let patient = TestUser::patient();
    let appointment_id = book_as(&f, &patient).await;

    let stranger = TestUser::doctor();
    let result = accept_appointment(State(f.state.clone()), stranger.extension(), Path(appointment_id)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let result = accept_appointment(State(f.state.clone()), patient.extension(), Path(appointment_id)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let Json(body) = accept_appointment(State(f.state.clone()), f.doctor.extension(), Path(appointment_id))
        .await
        .unwrap();
    assert_eq!(body["status"], "accepted");

    let result = accept_appointment(State(f.state.clone()), f.doctor.extension(), Path(appointment_id)).await;
    assert_matches!(
        result,
        Err(AppError::InvalidTransition { current: AppointmentStatus::Accepted, .. })
    );
}

#[tokio::test]
async fn test_patient_cancels_and_reopen_needs_owner() {
    let f = fixture().await;
    let patient = TestUser::patient();
    let appointment_id = book_as(&f, &patient).await;

    let Json(body) = cancel_appointment(State(f.state.clone()), patient.extension(), Path(appointment_id))
        .await
        .unwrap();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["availableActions"], serde_json::json!(["reopen"]));

    let result = reopen_appointment(State(f.state.clone()), patient.extension(), Path(appointment_id)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let Json(body) = reopen_appointment(State(f.state.clone()), f.doctor.extension(), Path(appointment_id))
        .await
        .unwrap();
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn test_get_appointment_visibility() {
    let f = fixture().await;
    let patient = TestUser::patient();
    let appointment_id = book_as(&f, &patient).await;

    for caller in [&patient, &f.doctor] {
        let Json(body) = get_appointment(State(f.state.clone()), caller.extension(), Path(appointment_id))
            .await
            .unwrap();
        assert_eq!(body["id"], appointment_id.to_string());
    }

    let Json(_) = get_appointment(State(f.state.clone()), TestUser::admin().extension(), Path(appointment_id))
        .await
        .unwrap();

    let result = get_appointment(State(f.state.clone()), TestUser::patient().extension(), Path(appointment_id)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let result = get_appointment(State(f.state.clone()), patient.extension(), Path(Uuid::new_v4())).await;
    assert_matches!(result, Err(AppError::NotFound(_)));
}
