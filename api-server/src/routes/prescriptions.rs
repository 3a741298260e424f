use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier, Resource};
use crate::auth::policy::Authorized;
use crate::error::ApiError;
use crate::models::{Prescription, PrescriptionInput, PrescriptionUpdate};
use crate::routes::helpers::{parse_id, require_text};
use crate::store::Store;

#[openapi(tag = "Prescriptions")]
#[post("/prescriptions", data = "<payload>")]
pub async fn create_prescription(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<PrescriptionInput>,
) -> Result<status::Custom<Json<Prescription>>, ApiError> {
    let input = payload.into_inner();
    require_text(&input.medication_details, "medication_details")?;

    let prescription = store
        .run(store.prescriptions.create_prescription(input))
        .await?;
    audit.record(
        auth.id(),
        AuditAction::Create(Resource::Prescription),
        prescription.id,
    );

    Ok(status::Custom(Status::Created, Json(prescription)))
}

#[openapi(tag = "Prescriptions")]
#[get("/prescriptions")]
pub async fn list_prescriptions(
    _auth: Authorized,
    store: &State<Store>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let prescriptions = store.run(store.prescriptions.list_prescriptions()).await?;
    Ok(Json(prescriptions))
}

#[openapi(tag = "Prescriptions")]
#[get("/prescriptions/<id>")]
pub async fn get_prescription(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(id, "prescription")?;
    let prescription = store
        .run(store.prescriptions.find_prescription(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("prescription not found".to_string()))?;
    audit.record(auth.id(), AuditAction::FetchById(Resource::Prescription), id);

    Ok(Json(prescription))
}

#[openapi(tag = "Prescriptions")]
#[patch("/prescriptions/<id>", data = "<payload>")]
pub async fn update_prescription(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
    payload: Json<PrescriptionUpdate>,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(id, "prescription")?;
    let update = payload.into_inner();
    if let Some(details) = update.medication_details.as_deref() {
        require_text(details, "medication_details")?;
    }

    let prescription = store
        .run(store.prescriptions.update_prescription(id, update))
        .await?;
    audit.record(auth.id(), AuditAction::Update(Resource::Prescription), id);

    Ok(Json(prescription))
}

#[openapi(tag = "Prescriptions")]
#[delete("/prescriptions/<id>")]
pub async fn delete_prescription(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<status::NoContent, ApiError> {
    let id = parse_id(id, "prescription")?;
    store.run(store.prescriptions.delete_prescription(id)).await?;
    audit.record(auth.id(), AuditAction::Delete(Resource::Prescription), id);

    Ok(status::NoContent)
}
