pub mod booking;
pub mod events;
pub mod lifecycle;

pub use booking::BookingStateMachine;
pub use events::{spawn_notification_listener, AppointmentEvent, AppointmentEventKind, NotificationPublisher};
pub use lifecycle::AppointmentLifecycleService;
