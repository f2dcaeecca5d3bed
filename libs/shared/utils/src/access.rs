use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::{OwnerKind, OwnerRef};

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    user.uuid()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

/// Providers act only on their own calendar. Admins act on any.
pub fn ensure_owner_access(user: &User, owner: &OwnerRef) -> Result<(), AppError> {
    let allowed = match user.role() {
        Role::Admin => true,
        Role::Doctor => owner.kind == OwnerKind::Doctor && caller_id(user)? == owner.id,
        Role::Organization => owner.kind == OwnerKind::Organization && caller_id(user)? == owner.id,
        Role::Patient | Role::Unknown => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Not allowed to manage the calendar of {} {}",
            owner.kind, owner.id
        )))
    }
}

/// Patients book and cancel for themselves. Admins may act for anyone.
pub fn ensure_patient_access(user: &User, patient_id: Uuid) -> Result<(), AppError> {
    match user.role() {
        Role::Admin => Ok(()),
        Role::Patient if caller_id(user)? == patient_id => Ok(()),
        _ => Err(AppError::Forbidden(
            "Not allowed to act for this patient".to_string(),
        )),
    }
}

/// Caller id for a patient acting on their own behalf.
pub fn require_patient(user: &User) -> Result<Uuid, AppError> {
    match user.role() {
        Role::Patient | Role::Admin => caller_id(user),
        _ => Err(AppError::Forbidden("Only patients can book appointments".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user(role: &str, id: Uuid) -> User {
        User {
            id: id.to_string(),
            email: None,
            role: Some(role.to_string()),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn test_doctor_manages_only_own_calendar() {
        let id = Uuid::new_v4();
        let doctor = user("doctor", id);

        assert!(ensure_owner_access(&doctor, &OwnerRef::doctor(id)).is_ok());
        assert_matches!(
            ensure_owner_access(&doctor, &OwnerRef::doctor(Uuid::new_v4())),
            Err(AppError::Forbidden(_))
        );
        assert_matches!(
            ensure_owner_access(&doctor, &OwnerRef::organization(id)),
            Err(AppError::Forbidden(_))
        );
    }

    #[test]
    fn test_hospital_role_acts_as_organization() {
        let id = Uuid::new_v4();
        assert!(ensure_owner_access(&user("hospital", id), &OwnerRef::organization(id)).is_ok());
    }

    #[test]
    fn test_admin_and_patient_access() {
        let admin = user("admin", Uuid::new_v4());
        let patient_id = Uuid::new_v4();
        let patient = user("patient", patient_id);

        assert!(ensure_owner_access(&admin, &OwnerRef::doctor(Uuid::new_v4())).is_ok());
        assert!(ensure_patient_access(&admin, patient_id).is_ok());
        assert!(ensure_patient_access(&patient, patient_id).is_ok());
        assert_matches!(ensure_patient_access(&patient, Uuid::new_v4()), Err(AppError::Forbidden(_)));
        assert_matches!(ensure_owner_access(&patient, &OwnerRef::doctor(patient_id)), Err(AppError::Forbidden(_)));
        assert_eq!(require_patient(&patient).unwrap(), patient_id);
        assert_matches!(require_patient(&user("doctor", Uuid::new_v4())), Err(AppError::Forbidden(_)));
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let mut doctor = user("doctor", Uuid::new_v4());
        doctor.id = "not-a-uuid".to_string();
        assert_matches!(ensure_owner_access(&doctor, &OwnerRef::doctor(Uuid::new_v4())), Err(AppError::Auth(_)));
    }
}
