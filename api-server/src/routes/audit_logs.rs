//! Admin access to the audit trail.

use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier, Resource};
use crate::auth::policy::Authorized;
use crate::error::ApiError;
use crate::models::{AuditLog, AuditLogInput, AuditLogUpdate};
use crate::routes::helpers::{parse_id, require_text};
use crate::store::Store;

/// Append a manual entry. Without `user_id` the caller is recorded as the actor.
#[openapi(tag = "Audit Logs")]
#[post("/audit_logs", data = "<payload>")]
pub async fn create_audit_log(
    auth: Authorized,
    store: &State<Store>,
    payload: Json<AuditLogInput>,
) -> Result<status::Custom<Json<AuditLog>>, ApiError> {
    let mut input = payload.into_inner();
    require_text(&input.action, "action")?;
    input.action = input.action.trim().to_uppercase();
    input.user_id = input.user_id.or(Some(auth.id()));

    let log = store.run(store.audit_logs.create_audit_log(input)).await?;
    Ok(status::Custom(Status::Created, Json(log)))
}

/// Newest first.
#[openapi(tag = "Audit Logs")]
#[get("/audit_logs")]
pub async fn list_audit_logs(
    _auth: Authorized,
    store: &State<Store>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let logs = store.run(store.audit_logs.list_audit_logs()).await?;
    Ok(Json(logs))
}

#[openapi(tag = "Audit Logs")]
#[get("/audit_logs/<id>")]
pub async fn get_audit_log(
    _auth: Authorized,
    store: &State<Store>,
    id: &str,
) -> Result<Json<AuditLog>, ApiError> {
    let id = parse_id(id, "audit log")?;
    store
        .run(store.audit_logs.find_audit_log(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("audit log not found".to_string()))
}

#[openapi(tag = "Audit Logs")]
#[patch("/audit_logs/<id>", data = "<payload>")]
pub async fn update_audit_log(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
    payload: Json<AuditLogUpdate>,
) -> Result<Json<AuditLog>, ApiError> {
    let id = parse_id(id, "audit log")?;
    let mut update = payload.into_inner();
    if let Some(action) = update.action.take() {
        require_text(&action, "action")?;
        update.action = Some(action.trim().to_uppercase());
    }

    let log = store
        .run(store.audit_logs.update_audit_log(id, update))
        .await?;
    audit.record(auth.id(), AuditAction::Update(Resource::AuditLog), id);

    Ok(Json(log))
}

#[openapi(tag = "Audit Logs")]
#[delete("/audit_logs/<id>")]
pub async fn delete_audit_log(
    auth: Authorized,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    id: &str,
) -> Result<status::NoContent, ApiError> {
    let id = parse_id(id, "audit log")?;
    store.run(store.audit_logs.delete_audit_log(id)).await?;
    audit.record(auth.id(), AuditAction::Delete(Resource::AuditLog), id);

    Ok(status::NoContent)
}
