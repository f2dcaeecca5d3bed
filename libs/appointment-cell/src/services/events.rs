use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus, OwnerRef};

use crate::models::TransitionAction;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventKind {
    Booked,
    Accepted,
    Declined,
    Cancelled,
    Reopened,
    Completed,
}

impl From<TransitionAction> for AppointmentEventKind {
    fn from(action: TransitionAction) -> Self {
        match action {
            TransitionAction::Accept => AppointmentEventKind::Accepted,
            TransitionAction::Decline => AppointmentEventKind::Declined,
            TransitionAction::Cancel => AppointmentEventKind::Cancelled,
            TransitionAction::Reopen => AppointmentEventKind::Reopened,
            TransitionAction::Complete => AppointmentEventKind::Completed,
        }
    }
}

/// Emitted after every successful booking or transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEvent {
    pub event_id: Uuid,
    pub kind: AppointmentEventKind,
    pub appointment_id: Uuid,
    pub slot_id: Uuid,
    pub owner: OwnerRef,
    pub patient_id: Uuid,
    pub previous_status: Option<AppointmentStatus>,
    pub status: AppointmentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl AppointmentEvent {
    pub fn new(
        kind: AppointmentEventKind,
        appointment: &Appointment,
        previous_status: Option<AppointmentStatus>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            appointment_id: appointment.id,
            slot_id: appointment.slot_id,
            owner: appointment.owner,
            patient_id: appointment.patient_id,
            previous_status,
            status: appointment.status,
            occurred_at: appointment.updated_at,
        }
    }
}

pub type EventReceiver = broadcast::Receiver<AppointmentEvent>;

/// Fan-out of appointment events to whoever is listening. Publishing never
/// blocks, and having no listeners is not an error.
#[derive(Debug, Clone)]
pub struct NotificationPublisher {
    sender: broadcast::Sender<AppointmentEvent>,
}

impl Default for NotificationPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Number of listeners the event reached.
    pub fn publish(&self, event: AppointmentEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No listeners for {:?} on appointment {}", event.kind, event.appointment_id);
                0
            }
        }
    }
}

/// Log every event until the publisher goes away. Stands in for the
/// notification transport.
pub fn spawn_notification_listener(publisher: &NotificationPublisher) -> JoinHandle<()> {
    let mut receiver = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => info!(
                    "Appointment {} {:?}: {:?} -> {} (slot {}, patient {})",
                    event.appointment_id,
                    event.kind,
                    event.previous_status,
                    event.status,
                    event.slot_id,
                    event.patient_id
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Notification listener lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Notification channel closed, listener exiting");
                    break;
                }
            }
        }
    })
}
