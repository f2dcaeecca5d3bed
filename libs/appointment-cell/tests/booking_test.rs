// libs/appointment-cell/tests/booking_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::{
    AppointmentEventKind, BookingError, BookingStateMachine, NotificationPublisher, TransitionAction,
};
use availability_cell::{AvailabilityIndex, PatternSpec, SlotMaterializer};
use shared_config::SchedulingConfig;
use shared_database::{InMemorySchedulingStore, SchedulingStore};
use shared_models::{AppointmentMedium, AppointmentStatus, Frequency, OwnerRef, Slot, SlotStatus};

struct Clinic {
    store: Arc<InMemorySchedulingStore>,
    machine: Arc<BookingStateMachine>,
    publisher: NotificationPublisher,
    index: AvailabilityIndex,
    owner: OwnerRef,
    slots: Vec<Slot>,
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()
}

/// One Tuesday, 09:00-10:30: two slots.
async fn clinic() -> Clinic {
    let config = SchedulingConfig {
        persistence_retry_backoff_ms: 1,
        ..SchedulingConfig::default()
    };
    let store = Arc::new(InMemorySchedulingStore::new());
    let owner = OwnerRef::doctor(Uuid::new_v4());

    SlotMaterializer::new(store.clone(), &config)
        .materialize(
            owner,
            &PatternSpec {
                weekdays: vec!["Tue".to_string()],
                frequency: Frequency::Weekly,
                start_date: day(),
                end_date: None,
                start_time: "09:00".to_string(),
                end_time: "10:30".to_string(),
                duration_minutes: None,
            },
            AppointmentMedium::Virtual,
            None,
        )
        .await
        .unwrap();

    let index = AvailabilityIndex::new(store.clone(), &config);
    let slots = index.slots_for_date(owner.id, day()).await.unwrap();
    let publisher = NotificationPublisher::default();

    Clinic {
        machine: Arc::new(BookingStateMachine::new(store.clone(), publisher.clone(), &config)),
        store,
        publisher,
        index,
        owner,
        slots,
    }
}

#[tokio::test]
async fn test_concurrent_bookings_have_exactly_one_winner() {
    let c = clinic().await;
    let slot_id = c.slots[0].id;

    let results = join_all((0..8).map(|_| {
        let machine = c.machine.clone();
        async move { machine.book(slot_id, Uuid::new_v4(), "Fever", None).await }
    }))
    .await;

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        match result {
            Ok(appointment) => assert_eq!(appointment.status, AppointmentStatus::Pending),
            Err(err) => assert_matches!(err, BookingError::SlotUnavailable { slot_id: id } if *id == slot_id),
        }
    }

    assert_eq!(c.store.appointment_count().await, 1);
    let slot = c.store.get_slot(slot_id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Booked);
}

#[tokio::test]
async fn test_concurrent_bookings_across_tasks() {
    let c = clinic().await;
    let slot_id = c.slots[1].id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let machine = c.machine.clone();
            tokio::spawn(async move { machine.book(slot_id, Uuid::new_v4(), "Rash", None).await })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(err) => assert_matches!(err, BookingError::SlotUnavailable { .. }),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn test_cancelling_accepted_appointment_frees_slot_immediately() {
    let c = clinic().await;
    let slot_id = c.slots[0].id;

    let appointment = c.machine.book(slot_id, Uuid::new_v4(), "Check-up", None).await.unwrap();
    c.machine.accept(appointment.id).await.unwrap();

    let open: Vec<Uuid> = c.index.slots_for_date(c.owner.id, day()).await.unwrap().iter().map(|s| s.id).collect();
    assert!(!open.contains(&slot_id));

    let cancelled = c.machine.cancel(appointment.id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let open: Vec<Uuid> = c.index.slots_for_date(c.owner.id, day()).await.unwrap().iter().map(|s| s.id).collect();
    assert!(open.contains(&slot_id));

    // Someone else can take it right away.
    assert!(c.machine.book(slot_id, Uuid::new_v4(), "Walk-in", None).await.is_ok());
}

#[tokio::test]
async fn test_reopen_reclaims_slot_or_reports_it_taken() {
    let c = clinic().await;
    let slot_id = c.slots[0].id;

    let first = c.machine.book(slot_id, Uuid::new_v4(), "Check-up", None).await.unwrap();
    c.machine.cancel(first.id).await.unwrap();

    let reopened = c.machine.reopen(first.id).await.unwrap();
    assert_eq!(reopened.status, AppointmentStatus::Pending);
    assert_eq!(c.store.get_slot(slot_id).await.unwrap().unwrap().status, SlotStatus::Booked);

    c.machine.cancel(first.id).await.unwrap();
    let second = c.machine.book(slot_id, Uuid::new_v4(), "Follow-up", None).await.unwrap();

    assert_matches!(
        c.machine.reopen(first.id).await,
        Err(BookingError::SlotUnavailable { slot_id: id }) if id == slot_id
    );
    let still_cancelled = c.machine.get(first.id).await.unwrap();
    assert_eq!(still_cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(c.machine.get(second.id).await.unwrap().status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected() {
    let c = clinic().await;

    let declined = c.machine.book(c.slots[0].id, Uuid::new_v4(), "Cough", None).await.unwrap();
    c.machine.decline(declined.id).await.unwrap();
    assert_matches!(
        c.machine.reopen(declined.id).await,
        Err(BookingError::InvalidTransition { current: AppointmentStatus::Declined, action: TransitionAction::Reopen, .. })
    );

    let done = c.machine.book(c.slots[1].id, Uuid::new_v4(), "Cough", None).await.unwrap();
    assert_matches!(
        c.machine.complete(done.id).await,
        Err(BookingError::InvalidTransition { current: AppointmentStatus::Pending, .. })
    );
    c.machine.accept(done.id).await.unwrap();
    c.machine.complete(done.id).await.unwrap();
    assert_matches!(
        c.machine.cancel(done.id).await,
        Err(BookingError::InvalidTransition { current: AppointmentStatus::Completed, .. })
    );

    // Declining freed the first slot.
    assert_eq!(c.store.get_slot(c.slots[0].id).await.unwrap().unwrap().status, SlotStatus::Available);
}

#[tokio::test]
async fn test_racing_transitions_have_one_winner() {
    let c = clinic().await;
    let appointment = c.machine.book(c.slots[0].id, Uuid::new_v4(), "Check-up", None).await.unwrap();

    let (accept, decline) = tokio::join!(c.machine.accept(appointment.id), c.machine.decline(appointment.id));

    match (accept, decline) {
        (Ok(a), Err(BookingError::InvalidTransition { current, action: TransitionAction::Decline, .. })) => {
            assert_eq!(a.status, AppointmentStatus::Accepted);
            assert_eq!(current, AppointmentStatus::Accepted);
        }
        (Err(BookingError::InvalidTransition { current, action: TransitionAction::Accept, .. }), Ok(d)) => {
            assert_eq!(d.status, AppointmentStatus::Declined);
            assert_eq!(current, AppointmentStatus::Declined);
        }
        other => panic!("expected exactly one winner, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_ids_and_blank_reason() {
    let c = clinic().await;

    assert_matches!(
        c.machine.book(Uuid::new_v4(), Uuid::new_v4(), "Fever", None).await,
        Err(BookingError::SlotNotFound(_))
    );
    assert_matches!(
        c.machine.book(c.slots[0].id, Uuid::new_v4(), "   ", None).await,
        Err(BookingError::Validation(_))
    );
    assert_matches!(c.machine.accept(Uuid::new_v4()).await, Err(BookingError::AppointmentNotFound(_)));
}

#[tokio::test]
async fn test_events_follow_every_change() {
    let c = clinic().await;
    let mut events = c.publisher.subscribe();

    let appointment = c.machine.book(c.slots[0].id, Uuid::new_v4(), "Check-up", Some("bring results".to_string())).await.unwrap();
    c.machine.accept(appointment.id).await.unwrap();
    c.machine.cancel(appointment.id).await.unwrap();
    // Failed transitions emit nothing.
    assert!(c.machine.accept(appointment.id).await.is_err());
    c.machine.reopen(appointment.id).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.appointment_id, appointment.id);
        assert_eq!(event.owner, c.owner);
        kinds.push((event.kind, event.previous_status, event.status));
    }

    assert_eq!(
        kinds,
        vec![
            (AppointmentEventKind::Booked, None, AppointmentStatus::Pending),
            (AppointmentEventKind::Accepted, Some(AppointmentStatus::Pending), AppointmentStatus::Accepted),
            (AppointmentEventKind::Cancelled, Some(AppointmentStatus::Accepted), AppointmentStatus::Cancelled),
            (AppointmentEventKind::Reopened, Some(AppointmentStatus::Cancelled), AppointmentStatus::Pending),
        ]
    );
}
