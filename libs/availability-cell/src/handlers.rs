use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::{AppointmentMedium, OwnerKind, OwnerRef};
use shared_utils::access::ensure_owner_access;

use crate::models::{
    requested_owner, CreateSlotPatternRequest, FirstAvailableQuery, PatternView, SlotDatesQuery,
    SlotView, SlotsQuery,
};
use crate::services::{AvailabilityIndex, SlotMaterializer};

/// Shared state for the availability routes.
pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
}

impl AvailabilityState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn SchedulingStore>) -> Arc<Self> {
        Arc::new(Self { config, store })
    }

    pub fn materializer(&self) -> SlotMaterializer {
        SlotMaterializer::new(self.store.clone(), &self.config.scheduling)
    }

    pub fn index(&self) -> AvailabilityIndex {
        AvailabilityIndex::new(self.store.clone(), &self.config.scheduling)
    }
}

fn own_calendar(user: &User) -> Option<OwnerRef> {
    let id = user.uuid()?;
    match user.role() {
        Role::Doctor => Some(OwnerRef { kind: OwnerKind::Doctor, id }),
        Role::Organization => Some(OwnerRef { kind: OwnerKind::Organization, id }),
        _ => None,
    }
}

// ==============================================================================
// PATTERN HANDLERS (AUTHENTICATED)
// ==============================================================================

#[axum::debug_handler]
pub async fn create_slot_pattern(
    State(state): State<Arc<AvailabilityState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotPatternRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let owner = requested_owner(&request, own_calendar(&user)).ok_or_else(|| {
        AppError::BadRequest("ownerId and ownerKind are required".to_string())
    })?;
    ensure_owner_access(&user, &owner)?;

    let medium = request.medium.unwrap_or(AppointmentMedium::Virtual);
    let report = state
        .materializer()
        .materialize(owner, &request.pattern, medium, Some(user.id.clone()))
        .await?;

    // Zero slots is a successful request but not a created resource set.
    let status = if report.warning.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(json!(report))))
}

#[axum::debug_handler]
pub async fn get_slot_pattern(
    State(state): State<Arc<AvailabilityState>>,
    Extension(_user): Extension<User>,
    Path(pattern_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let pattern = state.materializer().get_pattern(pattern_id).await?;
    Ok(Json(json!(PatternView::from(&pattern))))
}

// ==============================================================================
// PUBLIC READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<AvailabilityState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let index = state.index();

    if let Some(date) = query.date {
        let slots = index.slots_for_date(query.owner_id, date).await?;
        let views: Vec<SlotView> = slots.iter().map(SlotView::from).collect();
        return Ok(Json(json!({
            "ownerId": query.owner_id,
            "date": date,
            "slots": views,
            "total": views.len()
        })));
    }

    let from = query.start_date.ok_or_else(|| {
        AppError::BadRequest("Either date or startDate is required".to_string())
    })?;
    let to = query.end_date.unwrap_or(from);
    debug!("Slot listing for {} from {} to {}", query.owner_id, from, to);

    let page = index
        .available_slots_paged(
            query.owner_id,
            from,
            to,
            query.status,
            query.cursor.as_deref(),
            query.page_size,
        )
        .await?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn first_available_slot(
    State(state): State<Arc<AvailabilityState>>,
    Query(query): Query<FirstAvailableQuery>,
) -> Result<Json<Value>, AppError> {
    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());
    let slot = state
        .index()
        .first_available(query.owner_id, from, query.horizon_days)
        .await?;

    Ok(Json(json!({
        "ownerId": query.owner_id,
        "from": from,
        "slot": slot.as_ref().map(SlotView::from)
    })))
}

#[axum::debug_handler]
pub async fn list_slot_dates(
    State(state): State<Arc<AvailabilityState>>,
    Query(query): Query<SlotDatesQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state
        .index()
        .dates_with_availability(
            query.owner_id,
            query.start_date,
            query.end_date,
            query.cursor.as_deref(),
            query.page_size,
        )
        .await?;

    Ok(Json(json!(page)))
}
