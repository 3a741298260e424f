use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier, Resource};
use crate::auth::policy::Authorized;
use crate::error::ApiError;
use crate::models::{Patient, PatientInput, PatientUpdate};
use crate::routes::helpers::{ensure_doctor_scope, parse_id, require_text};
use crate::store::Store;
use crate::validation::normalize_cpf;

fn valid_cpf(raw: &str) -> Result<String, ApiError> {
    normalize_cpf(raw).ok_or_else(|| ApiError::BadRequest("invalid CPF".to_string()))
}

#[openapi(tag = "Patients")]
#[post("/patients", data = "<payload>")]
pub async fn create_patient(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<PatientInput>,
) -> Result<status::Custom<Json<Patient>>, ApiError> {
    let mut input = payload.into_inner();
    input.cpf = valid_cpf(&input.cpf)?;
    require_text(&input.phone, "phone")?;
    require_text(&input.address, "address")?;

    let patient = store.run(store.patients.create_patient(input)).await?;
    audit.record(auth.id(), AuditAction::Create(Resource::Patient), patient.id);

    Ok(status::Custom(Status::Created, Json(patient)))
}

#[openapi(tag = "Patients")]
#[get("/patients")]
pub async fn list_patients(
    _auth: Authorized,
    store: &State<Store>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let patients = store.run(store.patients.list_patients()).await?;
    Ok(Json(patients))
}

#[openapi(tag = "Patients")]
#[get("/patients/<id>")]
pub async fn get_patient(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<Json<Patient>, ApiError> {
    let id = parse_id(id, "patient")?;
    let patient = store
        .run(store.patients.find_patient(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("patient not found".to_string()))?;
    audit.record(auth.id(), AuditAction::FetchById(Resource::Patient), id);

    Ok(Json(patient))
}

/// Patients with at least one appointment with the doctor.
#[openapi(tag = "Patients")]
#[get("/patients/doctor/<doctor_id>")]
pub async fn list_patients_by_doctor(
    auth: Authorized,
    store: &State<Store>,
    doctor_id: &str,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let doctor_id = parse_id(doctor_id, "doctor")?;
    ensure_doctor_scope(store, &auth, doctor_id).await?;

    let patients = store
        .run(store.patients.list_patients_by_doctor(doctor_id))
        .await?;
    Ok(Json(patients))
}

#[openapi(tag = "Patients")]
#[patch("/patients/<id>", data = "<payload>")]
pub async fn update_patient(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
    payload: Json<PatientUpdate>,
) -> Result<Json<Patient>, ApiError> {
    let id = parse_id(id, "patient")?;
    let mut update = payload.into_inner();
    if let Some(cpf) = update.cpf.as_deref() {
        update.cpf = Some(valid_cpf(cpf)?);
    }

    let patient = store.run(store.patients.update_patient(id, update)).await?;
    audit.record(auth.id(), AuditAction::Update(Resource::Patient), id);

    Ok(Json(patient))
}

#[openapi(tag = "Patients")]
#[delete("/patients/<id>")]
pub async fn delete_patient(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<status::NoContent, ApiError> {
    let id = parse_id(id, "patient")?;
    store.run(store.patients.delete_patient(id)).await?;
    audit.record(auth.id(), AuditAction::Delete(Resource::Patient), id);

    Ok(status::NoContent)
}
