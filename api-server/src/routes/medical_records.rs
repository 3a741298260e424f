use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier, Resource};
use crate::auth::policy::Authorized;
use crate::error::ApiError;
use crate::models::{MedicalRecord, MedicalRecordInput, MedicalRecordUpdate};
use crate::routes::helpers::{ensure_doctor_scope, parse_id, require_text};
use crate::store::Store;

#[openapi(tag = "Medical Records")]
#[post("/medical_records", data = "<payload>")]
pub async fn create_medical_record(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<MedicalRecordInput>,
) -> Result<status::Custom<Json<MedicalRecord>>, ApiError> {
    let input = payload.into_inner();
    require_text(&input.diagnosis, "diagnosis")?;
    require_text(&input.treatment, "treatment")?;

    let record = store
        .run(store.medical_records.create_medical_record(input))
        .await?;
    audit.record(
        auth.id(),
        AuditAction::Create(Resource::MedicalRecord),
        record.id,
    );

    Ok(status::Custom(Status::Created, Json(record)))
}

#[openapi(tag = "Medical Records")]
#[get("/medical_records")]
pub async fn list_medical_records(
    _auth: Authorized,
    store: &State<Store>,
) -> Result<Json<Vec<MedicalRecord>>, ApiError> {
    let records = store
        .run(store.medical_records.list_medical_records())
        .await?;
    Ok(Json(records))
}

#[openapi(tag = "Medical Records")]
#[get("/medical_records/<id>")]
pub async fn get_medical_record(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<Json<MedicalRecord>, ApiError> {
    let id = parse_id(id, "medical record")?;
    let record = store
        .run(store.medical_records.find_medical_record(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("medical record not found".to_string()))?;
    audit.record(auth.id(), AuditAction::FetchById(Resource::MedicalRecord), id);

    Ok(Json(record))
}

#[openapi(tag = "Medical Records")]
#[get("/medical_records/doctor/<doctor_id>")]
pub async fn list_medical_records_by_doctor(
    auth: Authorized,
    store: &State<Store>,
    doctor_id: &str,
) -> Result<Json<Vec<MedicalRecord>>, ApiError> {
    let doctor_id = parse_id(doctor_id, "doctor")?;
    ensure_doctor_scope(store, &auth, doctor_id).await?;

    let records = store
        .run(store.medical_records.list_medical_records_by_doctor(doctor_id))
        .await?;
    Ok(Json(records))
}

#[openapi(tag = "Medical Records")]
#[patch("/medical_records/<id>", data = "<payload>")]
pub async fn update_medical_record(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
    payload: Json<MedicalRecordUpdate>,
) -> Result<Json<MedicalRecord>, ApiError> {
    let id = parse_id(id, "medical record")?;
    let record = store
        .run(
            store
                .medical_records
                .update_medical_record(id, payload.into_inner()),
        )
        .await?;
    audit.record(auth.id(), AuditAction::Update(Resource::MedicalRecord), id);

    Ok(Json(record))
}

#[openapi(tag = "Medical Records")]
#[delete("/medical_records/<id>")]
pub async fn delete_medical_record(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<status::NoContent, ApiError> {
    let id = parse_id(id, "medical record")?;
    store
        .run(store.medical_records.delete_medical_record(id))
        .await?;
    audit.record(auth.id(), AuditAction::Delete(Resource::MedicalRecord), id);

    Ok(status::NoContent)
}
