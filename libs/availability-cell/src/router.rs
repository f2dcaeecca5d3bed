use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/slots", get(handlers::list_slots))
        .route("/slots/first-available", get(handlers::first_available_slot))
        .route("/slot-dates", get(handlers::list_slot_dates));

    let protected_routes = Router::new()
        .route("/slot-patterns", post(handlers::create_slot_pattern))
        .route("/slot-patterns/{pattern_id}", get(handlers::get_slot_pattern))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
