use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::{BookingState, NotificationPublisher};
use availability_cell::router::availability_routes;
use availability_cell::AvailabilityState;
use shared_config::AppConfig;
use shared_database::SchedulingStore;

pub fn create_router(
    config: Arc<AppConfig>,
    store: Arc<dyn SchedulingStore>,
    publisher: NotificationPublisher,
) -> Router {
    let availability = AvailabilityState::new(config.clone(), store.clone());
    let booking = BookingState::new(config, store, publisher);

    Router::new()
        .route("/", get(|| async { "Amae Clinic scheduling API is running!" }))
        .merge(availability_routes(availability))
        .nest("/appointments", appointment_routes(booking))
}
