use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus, Slot, SlotPattern, SlotStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("slot {slot_id} already has an active appointment")]
    SlotOccupied { slot_id: Uuid },

    #[error("slot overlaps an existing slot: {0}")]
    SlotOverlap(String),

    #[error("appointment {appointment_id} is currently {current}")]
    StatusMismatch {
        appointment_id: Uuid,
        current: AppointmentStatus,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage rejected the request: {0}")]
    Rejected(String),

    #[error("storage returned malformed data: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Only transient failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Position of a slot in the stable `(date, start, id)` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&Slot> for SlotKey {
    fn from(slot: &Slot) -> Self {
        Self {
            date: slot.date,
            starts_at: slot.starts_at,
            id: slot.id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub owner_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub status: Option<SlotStatus>,
    /// Keyset cursor: only slots strictly after this key are returned.
    pub after: Option<SlotKey>,
    pub limit: Option<usize>,
}

impl SlotQuery {
    pub fn range(owner_id: Uuid, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            owner_id,
            from,
            to,
            status: None,
            after: None,
            limit: None,
        }
    }

    pub fn with_status(mut self, status: SlotStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn after(mut self, key: Option<SlotKey>) -> Self {
        self.after = key;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistence for patterns, slots and appointments.
///
/// Every write is atomic: a failed call leaves no partial state behind.
/// Slot status is owned by the store and kept in step with the set of
/// active appointments; callers never write it directly.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    /// Persist a pattern together with its materialized slots. Fails with
    /// `SlotOverlap` (writing nothing) if any slot overlaps a stored slot of
    /// the same owner or another slot in the batch.
    async fn commit_pattern(&self, pattern: &SlotPattern, slots: &[Slot]) -> Result<(), StoreError>;

    async fn get_pattern(&self, id: Uuid) -> Result<Option<SlotPattern>, StoreError>;

    /// Slots ordered by `(date, starts_at, id)`.
    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError>;

    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, StoreError>;

    /// Insert a pending appointment and mark its slot booked, or fail with
    /// `SlotOccupied` if another active appointment already holds the slot.
    async fn book_slot(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Compare-and-swap the appointment status. Moving into an active status
    /// claims the slot (`SlotOccupied` if taken); moving out of one frees it.
    async fn transition_appointment(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError>;

    /// Distinct dates in `[from, to]` with at least one available slot,
    /// ascending, strictly after `after` when given.
    async fn available_dates(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        after: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let start = match after {
            Some(date) => match date.succ_opt() {
                Some(next) if next > from => next,
                Some(_) => from,
                None => return Ok(vec![]),
            },
            None => from,
        };
        if start > to {
            return Ok(vec![]);
        }

        let slots = self
            .list_slots(&SlotQuery::range(owner_id, start, to).with_status(SlotStatus::Available))
            .await?;

        let mut dates: Vec<NaiveDate> = Vec::new();
        for slot in slots {
            if dates.last() != Some(&slot.date) {
                dates.push(slot.date);
                if dates.len() == limit {
                    break;
                }
            }
        }
        Ok(dates)
    }
}
