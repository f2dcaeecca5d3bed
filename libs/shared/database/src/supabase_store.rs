use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    Appointment, AppointmentMedium, AppointmentStatus, Frequency, OwnerKind, OwnerRef, Slot,
    SlotPattern, SlotStatus, WeekdaySet,
};

use crate::store::{SchedulingStore, SlotKey, SlotQuery, StoreError};
use crate::supabase::{ApiStatusError, SupabaseClient};

// Postgres error codes raised by the functions in sql/scheduling.sql
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";
const NO_DATA_FOUND: &str = "P0002";
const RAISE_EXCEPTION: &str = "P0001";
const STATUS_MISMATCH_PREFIX: &str = "status_mismatch:";
/// Rows per request when a listing has no caller limit. PostgREST may cap
/// responses (`max-rows`), so unbounded listings are read page by page.
const LIST_BATCH: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
struct PatternRow {
    id: Uuid,
    owner_kind: OwnerKind,
    owner_id: Uuid,
    weekdays: WeekdaySet,
    frequency: Frequency,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    start_time: NaiveTime,
    end_time: NaiveTime,
    duration_minutes: i64,
    medium: AppointmentMedium,
    rule: String,
    fingerprint: String,
    description: String,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&SlotPattern> for PatternRow {
    fn from(p: &SlotPattern) -> Self {
        Self {
            id: p.id,
            owner_kind: p.owner.kind,
            owner_id: p.owner.id,
            weekdays: p.weekdays,
            frequency: p.frequency,
            start_date: p.start_date,
            end_date: p.end_date,
            start_time: p.start_time,
            end_time: p.end_time,
            duration_minutes: p.duration_minutes,
            medium: p.medium,
            rule: p.rule.clone(),
            fingerprint: p.fingerprint.clone(),
            description: p.description.clone(),
            created_by: p.created_by.clone(),
            created_at: p.created_at,
        }
    }
}

impl From<PatternRow> for SlotPattern {
    fn from(row: PatternRow) -> Self {
        Self {
            id: row.id,
            owner: OwnerRef { kind: row.owner_kind, id: row.owner_id },
            weekdays: row.weekdays,
            frequency: row.frequency,
            start_date: row.start_date,
            end_date: row.end_date,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_minutes: row.duration_minutes,
            medium: row.medium,
            rule: row.rule,
            fingerprint: row.fingerprint,
            description: row.description,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SlotRow {
    id: Uuid,
    owner_kind: OwnerKind,
    owner_id: Uuid,
    pattern_id: Uuid,
    date: NaiveDate,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    status: SlotStatus,
    medium: AppointmentMedium,
    created_at: DateTime<Utc>,
}

impl From<&Slot> for SlotRow {
    fn from(s: &Slot) -> Self {
        Self {
            id: s.id,
            owner_kind: s.owner.kind,
            owner_id: s.owner.id,
            pattern_id: s.pattern_id,
            date: s.date,
            starts_at: s.starts_at,
            ends_at: s.ends_at,
            status: s.status,
            medium: s.medium,
            created_at: s.created_at,
        }
    }
}

impl From<SlotRow> for Slot {
    fn from(row: SlotRow) -> Self {
        Self {
            id: row.id,
            owner: OwnerRef { kind: row.owner_kind, id: row.owner_id },
            pattern_id: row.pattern_id,
            date: row.date,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            status: row.status,
            medium: row.medium,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    slot_id: Uuid,
    owner_kind: OwnerKind,
    owner_id: Uuid,
    patient_id: Uuid,
    status: AppointmentStatus,
    reason: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Appointment> for AppointmentRow {
    fn from(a: &Appointment) -> Self {
        Self {
            id: a.id,
            slot_id: a.slot_id,
            owner_kind: a.owner.kind,
            owner_id: a.owner.id,
            patient_id: a.patient_id,
            status: a.status,
            reason: a.reason.clone(),
            notes: a.notes.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            slot_id: row.slot_id,
            owner: OwnerRef { kind: row.owner_kind, id: row.owner_id },
            patient_id: row.patient_id,
            status: row.status,
            reason: row.reason,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Store backed by PostgREST. Multi-row writes go through Postgres functions
/// so each call runs in a single transaction.
pub struct SupabaseSchedulingStore {
    supabase: SupabaseClient,
    service_key: String,
}

impl SupabaseSchedulingStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::service(config),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    pub fn with_client(supabase: SupabaseClient, service_key: &str) -> Self {
        Self {
            supabase,
            service_key: service_key.to_string(),
        }
    }

    async fn fetch_rows<T>(&self, path: &str) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(&self.service_key), None)
            .await
            .map_err(|e| classify(e).into_store_error())?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| StoreError::Malformed(e.to_string())))
            .collect()
    }

    async fn call_rpc<T>(&self, function: &str, args: Value) -> Result<T, RpcFailure>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/rpc/{}", function);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.supabase
            .request_with_headers(Method::POST, &path, Some(&self.service_key), Some(args), Some(headers))
            .await
            .map_err(classify)
    }

    async fn fetch_slot_page(
        &self,
        query: &SlotQuery,
        after: Option<SlotKey>,
        limit: usize,
    ) -> Result<Vec<Slot>, StoreError> {
        let mut path = format!(
            "/rest/v1/slots?owner_id=eq.{}&date=gte.{}&date=lte.{}&order=date.asc,starts_at.asc,id.asc&limit={}",
            query.owner_id, query.from, query.to, limit
        );

        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }

        if let Some(after) = after {
            let starts = timestamp(after.starts_at);
            path.push_str(&format!(
                "&or=(date.gt.{d},and(date.eq.{d},starts_at.gt.{s}),and(date.eq.{d},starts_at.eq.{s},id.gt.{i}))",
                d = after.date,
                s = starts,
                i = after.id
            ));
        }

        let rows: Vec<SlotRow> = self.fetch_rows(&path).await?;
        Ok(rows.into_iter().map(Slot::from).collect())
    }
}

/// A failed RPC, split by the Postgres error code the function raised.
#[derive(Debug)]
enum RpcFailure {
    Overlap(String),
    Unique(String),
    Missing(String),
    StatusMismatch(String),
    Store(StoreError),
}

impl RpcFailure {
    fn into_store_error(self) -> StoreError {
        match self {
            RpcFailure::Overlap(message) => StoreError::SlotOverlap(message),
            RpcFailure::Unique(message)
            | RpcFailure::Missing(message)
            | RpcFailure::StatusMismatch(message) => StoreError::Rejected(message),
            RpcFailure::Store(err) => err,
        }
    }
}

fn classify(err: anyhow::Error) -> RpcFailure {
    if let Some(api) = err.downcast_ref::<ApiStatusError>() {
        let message = api.message.clone();
        return match api.code.as_deref() {
            Some(EXCLUSION_VIOLATION) => RpcFailure::Overlap(message),
            Some(UNIQUE_VIOLATION) => RpcFailure::Unique(message),
            Some(NO_DATA_FOUND) => RpcFailure::Missing(message),
            Some(RAISE_EXCEPTION) if message.starts_with(STATUS_MISMATCH_PREFIX) => {
                RpcFailure::StatusMismatch(message)
            }
            _ if api.status >= 500 || api.status == 408 || api.status == 429 => {
                RpcFailure::Store(StoreError::Unavailable(message))
            }
            _ => RpcFailure::Store(StoreError::Rejected(message)),
        };
    }
    if err.downcast_ref::<reqwest::Error>().is_some() {
        return RpcFailure::Store(StoreError::Unavailable(err.to_string()));
    }
    RpcFailure::Store(StoreError::Malformed(err.to_string()))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_mismatch(appointment_id: Uuid, message: &str) -> StoreError {
    let raw = message.trim_start_matches(STATUS_MISMATCH_PREFIX).trim();
    match serde_json::from_value::<AppointmentStatus>(json!(raw)) {
        Ok(current) => StoreError::StatusMismatch { appointment_id, current },
        Err(_) => {
            warn!("Unparseable appointment status in '{}'", message);
            StoreError::Malformed(message.to_string())
        }
    }
}

#[async_trait]
impl SchedulingStore for SupabaseSchedulingStore {
    async fn commit_pattern(&self, pattern: &SlotPattern, slots: &[Slot]) -> Result<(), StoreError> {
        debug!("Committing pattern {} with {} slots via RPC", pattern.id, slots.len());

        let rows: Vec<SlotRow> = slots.iter().map(SlotRow::from).collect();
        let args = json!({
            "p_pattern": PatternRow::from(pattern),
            "p_slots": rows,
        });

        let _: Value = self
            .call_rpc("commit_slot_pattern", args)
            .await
            .map_err(RpcFailure::into_store_error)?;
        Ok(())
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<SlotPattern>, StoreError> {
        let path = format!("/rest/v1/slot_patterns?id=eq.{}", id);
        let rows: Vec<PatternRow> = self.fetch_rows(&path).await?;
        Ok(rows.into_iter().next().map(SlotPattern::from))
    }

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
        if let Some(limit) = query.limit {
            return self.fetch_slot_page(query, query.after, limit).await;
        }

        // Until an empty page: a short page may only mean the server capped it.
        let mut slots: Vec<Slot> = Vec::new();
        let mut after = query.after;
        loop {
            let page = self.fetch_slot_page(query, after, LIST_BATCH).await?;
            match page.last() {
                Some(last) => after = Some(SlotKey::from(last)),
                None => break,
            }
            slots.extend(page);
        }
        Ok(slots)
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, StoreError> {
        let path = format!("/rest/v1/slots?id=eq.{}", id);
        let rows: Vec<SlotRow> = self.fetch_rows(&path).await?;
        Ok(rows.into_iter().next().map(Slot::from))
    }

    async fn book_slot(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let args = json!({ "p_appointment": AppointmentRow::from(appointment) });
        let slot_id = appointment.slot_id;

        match self.call_rpc::<AppointmentRow>("book_slot", args).await {
            Ok(row) => Ok(row.into()),
            Err(RpcFailure::Unique(_)) => Err(StoreError::SlotOccupied { slot_id }),
            Err(RpcFailure::Missing(_)) => Err(StoreError::NotFound { entity: "slot", id: slot_id }),
            Err(other) => Err(other.into_store_error()),
        }
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<AppointmentRow> = self.fetch_rows(&path).await?;
        Ok(rows.into_iter().next().map(Appointment::from))
    }

    async fn transition_appointment(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let args = json!({
            "p_id": id,
            "p_expected": expected,
            "p_next": next,
            "p_at": timestamp(at),
        });

        match self.call_rpc::<AppointmentRow>("transition_appointment", args).await {
            Ok(row) => Ok(row.into()),
            Err(RpcFailure::StatusMismatch(message)) => Err(parse_mismatch(id, &message)),
            Err(RpcFailure::Missing(_)) => Err(StoreError::NotFound { entity: "appointment", id }),
            Err(RpcFailure::Unique(message)) => {
                // Reopening a cancelled appointment whose slot was rebooked.
                debug!("Transition of {} blocked: {}", id, message);
                let slot_id = self
                    .get_appointment(id)
                    .await?
                    .map(|a| a.slot_id)
                    .unwrap_or(id);
                Err(StoreError::SlotOccupied { slot_id })
            }
            Err(other) => Err(other.into_store_error()),
        }
    }
}
