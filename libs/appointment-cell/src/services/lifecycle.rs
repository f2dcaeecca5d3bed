// libs/appointment-cell/src/services/lifecycle.rs
use tracing::debug;
use uuid::Uuid;

use shared_models::AppointmentStatus;

use crate::error::BookingError;
use crate::models::TransitionAction;

/// The appointment transition table.
///
/// ```text
/// Pending   -> Accepted | Declined | Cancelled
/// Accepted  -> Completed | Cancelled
/// Cancelled -> Pending (reopen)
/// ```
///
/// Declined and Completed are terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Statuses reachable from `current` in one step.
    pub fn get_valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Accepted,
                AppointmentStatus::Declined,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Accepted => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Pending],
            AppointmentStatus::Declined | AppointmentStatus::Completed => vec![],
        }
    }

    /// Actions a caller may take on an appointment in `current`.
    pub fn available_actions(&self, current: AppointmentStatus) -> Vec<TransitionAction> {
        TransitionAction::ALL
            .into_iter()
            .filter(|action| self.allows(current, *action))
            .collect()
    }

    pub fn allows(&self, current: AppointmentStatus, action: TransitionAction) -> bool {
        self.get_valid_transitions(current).contains(&action.target())
    }

    /// Target status for `action`, or `InvalidTransition` carrying `current`.
    pub fn validate_status_transition(
        &self,
        appointment_id: Uuid,
        current: AppointmentStatus,
        action: TransitionAction,
    ) -> Result<AppointmentStatus, BookingError> {
        if self.allows(current, action) {
            Ok(action.target())
        } else {
            debug!("Rejecting {} on appointment {} in {}", action, appointment_id, current);
            Err(BookingError::InvalidTransition {
                appointment_id,
                current,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use AppointmentStatus::*;
    use TransitionAction::*;

    #[test]
    fn test_transition_table() {
        let lifecycle = AppointmentLifecycleService::new();
        let allowed = [
            (Pending, Accept),
            (Pending, Decline),
            (Pending, Cancel),
            (Accepted, Complete),
            (Accepted, Cancel),
            (Cancelled, Reopen),
        ];

        for status in [Pending, Accepted, Declined, Cancelled, Completed] {
            for action in TransitionAction::ALL {
                let expected = allowed.contains(&(status, action));
                assert_eq!(
                    lifecycle.allows(status, action),
                    expected,
                    "{} from {}",
                    action,
                    status
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_actions() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.available_actions(Declined).is_empty());
        assert!(lifecycle.available_actions(Completed).is_empty());
        assert_eq!(lifecycle.available_actions(Cancelled), vec![Reopen]);
        assert_eq!(lifecycle.available_actions(Accepted), vec![Cancel, Complete]);
    }

    #[test]
    fn test_invalid_transition_carries_current_status() {
        let id = Uuid::new_v4();
        let result = AppointmentLifecycleService::new().validate_status_transition(id, Declined, Reopen);

        assert_matches!(
            result,
            Err(BookingError::InvalidTransition { appointment_id, current: Declined, action: Reopen })
                if appointment_id == id
        );
        assert_eq!(
            AppointmentLifecycleService::new().validate_status_transition(id, Pending, Accept).unwrap(),
            Accepted
        );
    }
}
