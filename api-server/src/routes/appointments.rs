use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier, Resource};
use crate::auth::policy::Authorized;
use crate::auth::roles::Role;
use crate::error::ApiError;
use crate::models::{Appointment, AppointmentInput, AppointmentUpdate};
use crate::routes::helpers::{ensure_doctor_scope, ensure_patient_scope, parse_id};
use crate::store::Store;

/// Book an appointment. Patients may only book for themselves.
#[openapi(tag = "Appointments")]
#[post("/appointments", data = "<payload>")]
pub async fn create_appointment(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<AppointmentInput>,
) -> Result<status::Custom<Json<Appointment>>, ApiError> {
    let input = payload.into_inner();
    if auth.role() == Role::Patient {
        ensure_patient_scope(store, &auth, input.patient_id).await?;
    }

    let appointment = store
        .run(store.appointments.create_appointment(input))
        .await?;
    audit.record(
        auth.id(),
        AuditAction::Create(Resource::Appointment),
        appointment.id,
    );

    Ok(status::Custom(Status::Created, Json(appointment)))
}

#[openapi(tag = "Appointments")]
#[get("/appointments")]
pub async fn list_appointments(
    _auth: Authorized,
    store: &State<Store>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let appointments = store.run(store.appointments.list_appointments()).await?;
    Ok(Json(appointments))
}

#[openapi(tag = "Appointments")]
#[get("/appointments/<id>")]
pub async fn get_appointment(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(id, "appointment")?;
    let appointment = store
        .run(store.appointments.find_appointment(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("appointment not found".to_string()))?;
    audit.record(auth.id(), AuditAction::FetchById(Resource::Appointment), id);

    Ok(Json(appointment))
}

#[openapi(tag = "Appointments")]
#[get("/appointments/patient/<patient_id>")]
pub async fn list_appointments_by_patient(
    auth: Authorized,
    store: &State<Store>,
    patient_id: &str,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let patient_id = parse_id(patient_id, "patient")?;
    ensure_patient_scope(store, &auth, patient_id).await?;

    let appointments = store
        .run(store.appointments.list_appointments_by_patient(patient_id))
        .await?;
    Ok(Json(appointments))
}

#[openapi(tag = "Appointments")]
#[get("/appointments/doctor/<doctor_id>")]
pub async fn list_appointments_by_doctor(
    auth: Authorized,
    store: &State<Store>,
    doctor_id: &str,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let doctor_id = parse_id(doctor_id, "doctor")?;
    ensure_doctor_scope(store, &auth, doctor_id).await?;

    let appointments = store
        .run(store.appointments.list_appointments_by_doctor(doctor_id))
        .await?;
    Ok(Json(appointments))
}

#[openapi(tag = "Appointments")]
#[patch("/appointments/<id>", data = "<payload>")]
pub async fn update_appointment(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
    payload: Json<AppointmentUpdate>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(id, "appointment")?;
    let appointment = store
        .run(store.appointments.update_appointment(id, payload.into_inner()))
        .await?;
    audit.record(auth.id(), AuditAction::Update(Resource::Appointment), id);

    Ok(Json(appointment))
}

#[openapi(tag = "Appointments")]
#[delete("/appointments/<id>")]
pub async fn delete_appointment(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<status::NoContent, ApiError> {
    let id = parse_id(id, "appointment")?;
    store.run(store.appointments.delete_appointment(id)).await?;
    audit.record(auth.id(), AuditAction::Delete(Resource::Appointment), id);

    Ok(status::NoContent)
}
