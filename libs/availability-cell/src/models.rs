use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{
    AppointmentMedium, Frequency, OwnerKind, OwnerRef, Slot, SlotPattern, SlotStatus,
};

// ==============================================================================
// PATTERN INPUT
// ==============================================================================

/// Declarative pattern as submitted by a provider. Times are `HH:mm` (or
/// `HH:mm:ss`) strings and are parsed by the compiler so that malformed
/// values are reported against the right field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSpec {
    pub weekdays: Vec<String>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSlotPatternRequest {
    /// Required for admins; providers default to their own calendar.
    pub owner_id: Option<Uuid>,
    pub owner_kind: Option<OwnerKind>,
    #[serde(flatten)]
    pub pattern: PatternSpec,
    pub medium: Option<AppointmentMedium>,
}

// ==============================================================================
// MATERIALIZATION REPORT
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoSlotsReason {
    /// No date in the window matches the weekday set and frequency.
    EmptyRecurrence,
    /// Every candidate slot was already materialized.
    AlreadyMaterialized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoSlotsGeneratedWarning {
    pub code: String,
    pub reason: NoSlotsReason,
    pub message: String,
}

impl NoSlotsGeneratedWarning {
    pub fn new(reason: NoSlotsReason) -> Self {
        let message = match reason {
            NoSlotsReason::EmptyRecurrence => {
                "No date in the pattern window matches the selected weekdays"
            }
            NoSlotsReason::AlreadyMaterialized => {
                "Every slot of this pattern already exists for the owner"
            }
        };
        Self {
            code: "NO_SLOTS_GENERATED".to_string(),
            reason,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationReport {
    pub pattern_id: Uuid,
    pub created: usize,
    pub skipped: usize,
    pub covered_from: NaiveDate,
    pub covered_to: NaiveDate,
    pub rule: String,
    pub description: String,
    pub warning: Option<NoSlotsGeneratedWarning>,
}

// ==============================================================================
// READ MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_kind: OwnerKind,
    pub pattern_id: Uuid,
    pub date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: SlotStatus,
    pub medium: AppointmentMedium,
}

impl From<&Slot> for SlotView {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id,
            owner_id: slot.owner.id,
            owner_kind: slot.owner.kind,
            pattern_id: slot.pattern_id,
            date: slot.date,
            starts_at: slot.starts_at,
            ends_at: slot.ends_at,
            status: slot.status,
            medium: slot.medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_kind: OwnerKind,
    pub weekdays: Vec<String>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    pub medium: AppointmentMedium,
    pub rule: String,
    pub fingerprint: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&SlotPattern> for PatternView {
    fn from(pattern: &SlotPattern) -> Self {
        Self {
            id: pattern.id,
            owner_id: pattern.owner.id,
            owner_kind: pattern.owner.kind,
            weekdays: pattern.weekdays.into(),
            frequency: pattern.frequency,
            start_date: pattern.start_date,
            end_date: pattern.end_date,
            start_time: pattern.start_time.format("%H:%M").to_string(),
            end_time: pattern.end_time.format("%H:%M").to_string(),
            duration_minutes: pattern.duration_minutes,
            medium: pattern.medium,
            rule: pattern.rule.clone(),
            fingerprint: pattern.fingerprint.clone(),
            description: pattern.description.clone(),
            created_at: pattern.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<SlotView>,
}

/// One page of slots, grouped by day in ascending order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotPage {
    pub owner_id: Uuid,
    pub status: SlotStatus,
    pub days: Vec<DaySlots>,
    pub page_size: usize,
    pub next_cursor: Option<String>,
}

impl SlotPage {
    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|day| day.slots.len()).sum()
    }

    pub fn slot_ids(&self) -> Vec<Uuid> {
        self.days
            .iter()
            .flat_map(|day| day.slots.iter().map(|slot| slot.id))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatePage {
    pub owner_id: Uuid,
    pub dates: Vec<NaiveDate>,
    pub page_size: usize,
    pub next_cursor: Option<String>,
}

// ==============================================================================
// QUERY PARAMETERS
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsQuery {
    pub owner_id: Uuid,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cursor: Option<String>,
    pub page_size: Option<usize>,
    pub status: Option<SlotStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDatesQuery {
    pub owner_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cursor: Option<String>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstAvailableQuery {
    pub owner_id: Uuid,
    pub from: Option<NaiveDate>,
    pub horizon_days: Option<i64>,
}

/// Resolve whose calendar a create request targets.
pub fn requested_owner(request: &CreateSlotPatternRequest, fallback: Option<OwnerRef>) -> Option<OwnerRef> {
    match (request.owner_id, request.owner_kind, fallback) {
        (Some(id), Some(kind), _) => Some(OwnerRef { kind, id }),
        (Some(id), None, Some(own)) => Some(OwnerRef { kind: own.kind, id }),
        (None, _, Some(own)) => Some(own),
        _ => None,
    }
}
