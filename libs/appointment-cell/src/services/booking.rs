// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::{retry_transient, SchedulingStore, StoreError};
use shared_models::{Appointment, AppointmentStatus};

use crate::error::BookingError;
use crate::models::TransitionAction;
use crate::services::events::{AppointmentEvent, AppointmentEventKind, NotificationPublisher};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Write path for appointments. Every state change is a compare-and-swap in
/// the store, so of two racing requests exactly one wins and the other gets
/// an explicit error.
pub struct BookingStateMachine {
    store: Arc<dyn SchedulingStore>,
    publisher: NotificationPublisher,
    lifecycle: AppointmentLifecycleService,
    retry_backoff: Duration,
}

impl BookingStateMachine {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        publisher: NotificationPublisher,
        config: &SchedulingConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            lifecycle: AppointmentLifecycleService::new(),
            retry_backoff: Duration::from_millis(config.persistence_retry_backoff_ms),
        }
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycleService {
        &self.lifecycle
    }

    /// Claim `slot_id` for `patient_id`, creating a Pending appointment.
    pub async fn book(
        &self,
        slot_id: Uuid,
        patient_id: Uuid,
        reason: &str,
        notes: Option<String>,
    ) -> Result<Appointment, BookingError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BookingError::Validation("A reason for the visit is required".to_string()));
        }

        let store = &self.store;
        let slot = retry_transient("load slot", self.retry_backoff, move || store.get_slot(slot_id))
            .await?
            .ok_or(BookingError::SlotNotFound(slot_id))?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            slot_id,
            owner: slot.owner,
            patient_id,
            status: AppointmentStatus::Pending,
            reason: reason.to_string(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
        };
        debug!("Booking slot {} for patient {} as {}", slot_id, patient_id, appointment.id);

        let candidate = &appointment;
        let booked = match retry_transient("book slot", self.retry_backoff, move || store.book_slot(candidate)).await {
            Ok(booked) => booked,
            Err(StoreError::SlotOccupied { .. }) => {
                // A retried write may have landed the first time around.
                match self.store.get_appointment(appointment.id).await? {
                    Some(ours) => ours,
                    None => {
                        info!("Slot {} already taken, patient {} lost the race", slot_id, patient_id);
                        return Err(BookingError::SlotUnavailable { slot_id });
                    }
                }
            }
            Err(StoreError::NotFound { .. }) => return Err(BookingError::SlotNotFound(slot_id)),
            Err(err) => return Err(err.into()),
        };

        info!("Appointment {} booked on slot {}", booked.id, slot_id);
        self.publisher
            .publish(AppointmentEvent::new(AppointmentEventKind::Booked, &booked, None));
        Ok(booked)
    }

    pub async fn accept(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, TransitionAction::Accept).await
    }

    /// Frees the slot.
    pub async fn decline(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, TransitionAction::Decline).await
    }

    /// Frees the slot immediately; it is bookable again as soon as this returns.
    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, TransitionAction::Cancel).await
    }

    /// Back to Pending, re-claiming the slot if nobody else took it meanwhile.
    pub async fn reopen(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, TransitionAction::Reopen).await
    }

    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, TransitionAction::Complete).await
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        let store = &self.store;
        retry_transient("load appointment", self.retry_backoff, move || {
            store.get_appointment(appointment_id)
        })
        .await?
        .ok_or(BookingError::AppointmentNotFound(appointment_id))
    }

    pub async fn transition(
        &self,
        appointment_id: Uuid,
        action: TransitionAction,
    ) -> Result<Appointment, BookingError> {
        let current = self.get(appointment_id).await?;
        let next = self
            .lifecycle
            .validate_status_transition(appointment_id, current.status, action)?;

        let store = &self.store;
        let expected = current.status;
        // Microseconds, so the timestamp survives a round trip through Postgres.
        let at = Utc::now().trunc_subsecs(6);
        let result = retry_transient("transition appointment", self.retry_backoff, move || {
            store.transition_appointment(appointment_id, expected, next, at)
        })
        .await;

        let updated = match result {
            Ok(updated) => updated,
            Err(StoreError::StatusMismatch { current, .. }) => {
                // A retried write may have landed the first time around.
                let ours = if current == next {
                    self.own_transition(appointment_id, next, at).await?
                } else {
                    None
                };
                match ours {
                    Some(ours) => ours,
                    None => {
                        info!(
                            "Concurrent update won on appointment {}: cannot {} from {}",
                            appointment_id, action, current
                        );
                        return Err(BookingError::InvalidTransition {
                            appointment_id,
                            current,
                            action,
                        });
                    }
                }
            }
            Err(StoreError::SlotOccupied { slot_id }) => {
                info!("Cannot {} appointment {}: slot {} was rebooked", action, appointment_id, slot_id);
                return Err(BookingError::SlotUnavailable { slot_id });
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(BookingError::AppointmentNotFound(appointment_id))
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            "Appointment {} moved {} -> {} ({})",
            appointment_id, expected, updated.status, action
        );
        self.publisher
            .publish(AppointmentEvent::new(action.into(), &updated, Some(expected)));
        Ok(updated)
    }

    /// The appointment if it sits in `next` with exactly our write timestamp.
    async fn own_transition(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, BookingError> {
        let stored = self.store.get_appointment(appointment_id).await?;
        Ok(stored.filter(|appointment| appointment.status == next && appointment.updated_at == at))
    }
}
