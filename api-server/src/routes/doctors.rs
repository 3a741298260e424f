use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier, Resource};
use crate::auth::policy::Authorized;
use crate::error::ApiError;
use crate::models::{Doctor, DoctorInput, DoctorUpdate};
use crate::routes::helpers::{parse_id, require_text};
use crate::store::Store;

#[openapi(tag = "Doctors")]
#[post("/doctors", data = "<payload>")]
pub async fn create_doctor(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<DoctorInput>,
) -> Result<status::Custom<Json<Doctor>>, ApiError> {
    let mut input = payload.into_inner();
    input.crm = input.crm.trim().to_uppercase();
    require_text(&input.crm, "crm")?;
    require_text(&input.specialty, "specialty")?;

    let doctor = store.run(store.doctors.create_doctor(input)).await?;
    audit.record(auth.id(), AuditAction::Create(Resource::Doctor), doctor.id);

    Ok(status::Custom(Status::Created, Json(doctor)))
}

#[openapi(tag = "Doctors")]
#[get("/doctors")]
pub async fn list_doctors(
    _auth: Authorized,
    store: &State<Store>,
) -> Result<Json<Vec<Doctor>>, ApiError> {
    let doctors = store.run(store.doctors.list_doctors()).await?;
    Ok(Json(doctors))
}

#[openapi(tag = "Doctors")]
#[get("/doctors/<id>")]
pub async fn get_doctor(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<Json<Doctor>, ApiError> {
    let id = parse_id(id, "doctor")?;
    let doctor = store
        .run(store.doctors.find_doctor(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("doctor not found".to_string()))?;
    audit.record(auth.id(), AuditAction::FetchById(Resource::Doctor), id);

    Ok(Json(doctor))
}

#[openapi(tag = "Doctors")]
#[patch("/doctors/<id>", data = "<payload>")]
pub async fn update_doctor(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
    payload: Json<DoctorUpdate>,
) -> Result<Json<Doctor>, ApiError> {
    let id = parse_id(id, "doctor")?;
    let mut update = payload.into_inner();
    if let Some(crm) = update.crm.take() {
        let crm = crm.trim().to_uppercase();
        require_text(&crm, "crm")?;
        update.crm = Some(crm);
    }

    let doctor = store.run(store.doctors.update_doctor(id, update)).await?;
    audit.record(auth.id(), AuditAction::Update(Resource::Doctor), id);

    Ok(Json(doctor))
}

#[openapi(tag = "Doctors")]
#[delete("/doctors/<id>")]
pub async fn delete_doctor(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<status::NoContent, ApiError> {
    let id = parse_id(id, "doctor")?;
    store.run(store.doctors.delete_doctor(id)).await?;
    audit.record(auth.id(), AuditAction::Delete(Resource::Doctor), id);

    Ok(status::NoContent)
}
