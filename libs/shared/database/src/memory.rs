use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus, Slot, SlotPattern, SlotStatus};

use crate::store::{SchedulingStore, SlotKey, SlotQuery, StoreError};

#[derive(Default)]
struct Tables {
    patterns: HashMap<Uuid, SlotPattern>,
    slots: HashMap<Uuid, Slot>,
    slots_by_owner: HashMap<Uuid, BTreeSet<SlotKey>>,
    appointments: HashMap<Uuid, Appointment>,
    /// slot id -> id of the single active appointment holding it
    active_by_slot: HashMap<Uuid, Uuid>,
}

impl Tables {
    fn owner_slots_on(&self, owner_id: Uuid, date: NaiveDate) -> impl Iterator<Item = &Slot> + '_ {
        let lower = SlotKey {
            date,
            starts_at: DateTime::<Utc>::MIN_UTC,
            id: Uuid::nil(),
        };
        self.slots_by_owner
            .get(&owner_id)
            .into_iter()
            .flat_map(move |keys| keys.range(lower..).take_while(move |key| key.date == date))
            .filter_map(|key| self.slots.get(&key.id))
    }

    fn set_slot_status(&mut self, slot_id: Uuid, status: SlotStatus) {
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.status = status;
        }
    }
}

/// Process-local store. A single lock guards all tables, so every trait
/// method is one critical section and therefore atomic.
#[derive(Default)]
pub struct InMemorySchedulingStore {
    tables: RwLock<Tables>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn slot_count(&self) -> usize {
        self.tables.read().await.slots.len()
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.read().await.appointments.len()
    }
}

#[async_trait]
impl SchedulingStore for InMemorySchedulingStore {
    async fn commit_pattern(&self, pattern: &SlotPattern, slots: &[Slot]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        for (index, slot) in slots.iter().enumerate() {
            let clashes_stored = tables
                .owner_slots_on(slot.owner.id, slot.date)
                .any(|existing| existing.overlaps(slot.starts_at, slot.ends_at));
            let clashes_batch = slots[..index].iter().any(|earlier| {
                earlier.owner.id == slot.owner.id
                    && earlier.date == slot.date
                    && earlier.overlaps(slot.starts_at, slot.ends_at)
            });

            if clashes_stored || clashes_batch {
                return Err(StoreError::SlotOverlap(format!(
                    "{} {}-{}",
                    slot.date,
                    slot.starts_at.format("%H:%M"),
                    slot.ends_at.format("%H:%M")
                )));
            }
        }

        tables.patterns.insert(pattern.id, pattern.clone());
        for slot in slots {
            tables
                .slots_by_owner
                .entry(slot.owner.id)
                .or_default()
                .insert(SlotKey::from(slot));
            tables.slots.insert(slot.id, slot.clone());
        }

        debug!("Committed pattern {} with {} slots", pattern.id, slots.len());
        Ok(())
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<SlotPattern>, StoreError> {
        Ok(self.tables.read().await.patterns.get(&id).cloned())
    }

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
        let tables = self.tables.read().await;
        let Some(keys) = tables.slots_by_owner.get(&query.owner_id) else {
            return Ok(vec![]);
        };

        let lower = match query.after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Included(SlotKey {
                date: query.from,
                starts_at: DateTime::<Utc>::MIN_UTC,
                id: Uuid::nil(),
            }),
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let slots = keys
            .range((lower, Bound::Unbounded))
            .skip_while(|key| key.date < query.from)
            .take_while(|key| key.date <= query.to)
            .filter_map(|key| tables.slots.get(&key.id))
            .filter(|slot| query.status.map_or(true, |status| slot.status == status))
            .take(limit)
            .cloned()
            .collect();

        Ok(slots)
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, StoreError> {
        Ok(self.tables.read().await.slots.get(&id).cloned())
    }

    async fn book_slot(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.slots.contains_key(&appointment.slot_id) {
            return Err(StoreError::NotFound {
                entity: "slot",
                id: appointment.slot_id,
            });
        }
        if tables.active_by_slot.contains_key(&appointment.slot_id) {
            return Err(StoreError::SlotOccupied {
                slot_id: appointment.slot_id,
            });
        }

        tables.active_by_slot.insert(appointment.slot_id, appointment.id);
        tables.set_slot_status(appointment.slot_id, SlotStatus::Booked);
        tables.appointments.insert(appointment.id, appointment.clone());

        Ok(appointment.clone())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn transition_appointment(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;

        let (slot_id, current) = match tables.appointments.get(&id) {
            Some(appointment) => (appointment.slot_id, appointment.status),
            None => return Err(StoreError::NotFound { entity: "appointment", id }),
        };

        if current != expected {
            return Err(StoreError::StatusMismatch {
                appointment_id: id,
                current,
            });
        }

        match (current.is_active(), next.is_active()) {
            (false, true) => {
                if tables.active_by_slot.contains_key(&slot_id) {
                    return Err(StoreError::SlotOccupied { slot_id });
                }
                tables.active_by_slot.insert(slot_id, id);
                tables.set_slot_status(slot_id, SlotStatus::Booked);
            }
            (true, false) => {
                tables.active_by_slot.remove(&slot_id);
                tables.set_slot_status(slot_id, SlotStatus::Available);
            }
            _ => {}
        }

        let appointment = tables
            .appointments
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "appointment", id })?;
        appointment.status = next;
        appointment.updated_at = at;

        Ok(appointment.clone())
    }
}
