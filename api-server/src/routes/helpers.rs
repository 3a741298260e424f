//! Shared helper functions for Rocket route handlers.

use uuid::Uuid;

use crate::auth::policy::Authorized;
use crate::auth::roles::Role;
use crate::error::ApiError;
use crate::store::Store;

/// Parse a path segment as a UUID, naming the entity in the 400 message.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest(format!("invalid {what} id")))
}

fn not_yours(what: &str) -> ApiError {
    ApiError::Forbidden(format!("{what} belongs to another account"))
}

/// Admins see every doctor; a doctor only their own profile.
pub async fn ensure_doctor_scope(
    store: &Store,
    auth: &Authorized,
    doctor_id: Uuid,
) -> Result<(), ApiError> {
    match auth.role() {
        Role::Admin => Ok(()),
        Role::Doctor => {
            let doctor = store
                .run(store.doctors.find_doctor(doctor_id))
                .await?
                .ok_or_else(|| ApiError::NotFound("doctor not found".to_string()))?;
            if doctor.user_id == auth.id() {
                Ok(())
            } else {
                Err(not_yours("doctor"))
            }
        }
        Role::Patient => Err(not_yours("doctor")),
    }
}

/// Admins see every patient; a patient only their own record.
pub async fn ensure_patient_scope(
    store: &Store,
    auth: &Authorized,
    patient_id: Uuid,
) -> Result<(), ApiError> {
    match auth.role() {
        Role::Admin => Ok(()),
        Role::Patient => {
            let patient = store
                .run(store.patients.find_patient(patient_id))
                .await?
                .ok_or_else(|| ApiError::NotFound("patient not found".to_string()))?;
            if patient.user_id == auth.id() {
                Ok(())
            } else {
                Err(not_yours("patient"))
            }
        }
        Role::Doctor => Err(not_yours("patient")),
    }
}

/// Reject blank required text fields.
pub fn require_text(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::BadRequest(format!("{field} is required")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_names_the_entity() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "patient").expect("valid id"), id);

        match parse_id("42", "patient") {
            Err(ApiError::BadRequest(message)) => assert_eq!(message, "invalid patient id"),
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(require_text("Amoxicillin 500mg", "medication_details").is_ok());
        assert!(matches!(
            require_text("   ", "diagnosis"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
