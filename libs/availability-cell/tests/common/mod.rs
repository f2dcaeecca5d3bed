#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use availability_cell::PatternSpec;
use shared_database::{InMemorySchedulingStore, SchedulingStore, SlotQuery, StoreError};
use shared_models::{Appointment, AppointmentStatus, Frequency, Slot, SlotPattern};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn weekly(days: &[&str], start: NaiveDate, end: Option<NaiveDate>, from: &str, to: &str) -> PatternSpec {
    PatternSpec {
        weekdays: days.iter().map(|d| d.to_string()).collect(),
        frequency: Frequency::Weekly,
        start_date: start,
        end_date: end,
        start_time: from.to_string(),
        end_time: to.to_string(),
        duration_minutes: None,
    }
}

/// Delegates to an in-memory store, failing the first `commit_failures`
/// commits as unavailable and optionally running a competing commit right
/// before the first real one.
pub struct ScriptedStore {
    pub inner: Arc<InMemorySchedulingStore>,
    commit_failures: AtomicU32,
    pub commit_calls: AtomicU32,
    competitor: std::sync::Mutex<Option<(SlotPattern, Vec<Slot>)>>,
}

impl ScriptedStore {
    pub fn new(inner: Arc<InMemorySchedulingStore>) -> Self {
        Self {
            inner,
            commit_failures: AtomicU32::new(0),
            commit_calls: AtomicU32::new(0),
            competitor: std::sync::Mutex::new(None),
        }
    }

    pub fn failing_commits(self, count: u32) -> Self {
        self.commit_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_competitor(self, pattern: SlotPattern, slots: Vec<Slot>) -> Self {
        *self.competitor.lock().unwrap() = Some((pattern, slots));
        self
    }
}

#[async_trait]
impl SchedulingStore for ScriptedStore {
    async fn commit_pattern(&self, pattern: &SlotPattern, slots: &[Slot]) -> Result<(), StoreError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.commit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.commit_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let competitor = self.competitor.lock().unwrap().take();
        if let Some((other, other_slots)) = competitor {
            self.inner.commit_pattern(&other, &other_slots).await?;
        }
        self.inner.commit_pattern(pattern, slots).await
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<SlotPattern>, StoreError> {
        self.inner.get_pattern(id).await
    }

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
        self.inner.list_slots(query).await
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, StoreError> {
        self.inner.get_slot(id).await
    }

    async fn book_slot(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        self.inner.book_slot(appointment).await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.get_appointment(id).await
    }

    async fn transition_appointment(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        self.inner.transition_appointment(id, expected, next, at).await
    }
}
