mod common;

use std::sync::Arc;
use std::time::Duration;

use clinic_api::audit::{AuditConfig, AuditEvent, AuditSink};
use clinic_api::auth::roles::Role;
use clinic_api::error::ErrorResponse;
use clinic_api::models::{Doctor, NewUser, User};
use clinic_api::store::{
    MemoryStore, StoreConfig, StoreError, StoreResult, UserRepository,
};
use clinic_api::test_support::{TestRocketBuilder, bearer};
use rocket::http::Status;
use serde_json::json;
use uuid::Uuid;

use common::{PASSWORD, seed_user, token_for, wait_for_audit};

struct FailingSink;

#[rocket::async_trait]
impl AuditSink for FailingSink {
    async fn append(&self, _event: &AuditEvent) -> StoreResult<()> {
        Err(StoreError::Unavailable("audit table offline".into()))
    }
}

struct HangingSink;

#[rocket::async_trait]
impl AuditSink for HangingSink {
    async fn append(&self, _event: &AuditEvent) -> StoreResult<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Users repository that never answers within the context budget.
struct SlowUsers;

#[rocket::async_trait]
impl UserRepository for SlowUsers {
    async fn create_user(&self, _user: NewUser) -> StoreResult<User> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(StoreError::Unavailable("unreachable".into()))
    }

    async fn find_user_by_email(&self, _email: &str) -> StoreResult<Option<User>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }

    async fn find_user(&self, _id: Uuid) -> StoreResult<Option<User>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }
}

fn quick_audit() -> AuditConfig {
    AuditConfig {
        queue_capacity: 8,
        max_attempts: 2,
        write_timeout: Duration::from_millis(50),
        retry_backoff: Duration::from_millis(10),
    }
}

#[rocket::async_test]
async fn login_events_eventually_reach_the_trail() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "doc@clinic.test", Role::Doctor).await;
    let client = TestRocketBuilder::new()
        .with_store(store.clone())
        .async_client()
        .await;

    let ok = client
        .post("/api/v1/login")
        .json(&json!({ "email": "doc@clinic.test", "password": PASSWORD }))
        .dispatch()
        .await;
    assert_eq!(ok.status(), Status::Ok);

    let failed = client
        .post("/api/v1/login")
        .json(&json!({ "email": "ghost@clinic.test", "password": PASSWORD }))
        .dispatch()
        .await;
    assert_eq!(failed.status(), Status::Unauthorized);

    let trail = wait_for_audit(&store, |trail| trail.len() >= 2).await;
    let success = trail
        .iter()
        .find(|log| log.action == "USER_LOGIN_SUCCESS")
        .expect("login success recorded");
    assert_eq!(success.user_id, user.id);

    let unknown = trail
        .iter()
        .find(|log| log.action == "USER_LOGIN_FAILED")
        .expect("failed login recorded");
    assert_eq!(unknown.user_id, Uuid::nil());
    assert!(unknown.description.contains("ghost@clinic.test"));
}

#[rocket::async_test]
async fn entity_mutations_are_attributed_to_the_actor() {
    let store = MemoryStore::new();
    let admin = seed_user(&store, "admin@clinic.test", Role::Admin).await;
    let doctor_user = seed_user(&store, "doc@clinic.test", Role::Doctor).await;
    let client = TestRocketBuilder::new()
        .with_store(store.clone())
        .async_client()
        .await;

    let created = client
        .post("/api/v1/doctors")
        .header(bearer(&token_for(&admin)))
        .json(&json!({
            "user_id": doctor_user.id,
            "crm": "crm-sp-3003",
            "specialty": "Dermatology",
        }))
        .dispatch()
        .await;
    assert_eq!(created.status(), Status::Created);
    let doctor: Doctor = created.into_json().await.expect("doctor");
    assert_eq!(doctor.crm, "CRM-SP-3003");

    let deleted = client
        .delete(format!("/api/v1/doctors/{}", doctor.id))
        .header(bearer(&token_for(&admin)))
        .dispatch()
        .await;
    assert_eq!(deleted.status(), Status::NoContent);

    let trail = wait_for_audit(&store, |trail| {
        trail.iter().any(|log| log.action == "DOCTOR_DELETE")
    })
    .await;
    let actions: Vec<&str> = trail.iter().map(|log| log.action.as_str()).collect();
    assert_eq!(actions, ["DOCTOR_CREATE", "DOCTOR_DELETE"]);
    assert!(trail.iter().all(|log| log.user_id == admin.id));
    assert_eq!(
        trail[0].description,
        format!("Doctor created with ID: {}", doctor.id)
    );

    let again = client
        .delete(format!("/api/v1/doctors/{}", doctor.id))
        .header(bearer(&token_for(&admin)))
        .dispatch()
        .await;
    assert_eq!(again.status(), Status::NotFound);
}

#[rocket::async_test]
async fn failing_sink_does_not_change_responses() {
    let client = TestRocketBuilder::new()
        .with_audit_sink(Arc::new(FailingSink))
        .with_audit_config(quick_audit())
        .async_client()
        .await;

    let response = client
        .post("/api/v1/register")
        .json(&json!({
            "username": "ana",
            "email": "ana@clinic.test",
            "password": PASSWORD,
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let login = client
        .post("/api/v1/login")
        .json(&json!({ "email": "ana@clinic.test", "password": PASSWORD }))
        .dispatch()
        .await;
    assert_eq!(login.status(), Status::Ok);
}

#[rocket::async_test]
async fn hanging_sink_never_delays_the_request() {
    let client = TestRocketBuilder::new()
        .with_audit_sink(Arc::new(HangingSink))
        .with_audit_config(AuditConfig {
            write_timeout: Duration::from_secs(60),
            ..quick_audit()
        })
        .async_client()
        .await;

    for n in 0..20 {
        let request = client
            .post("/api/v1/register")
            .json(&json!({
                "username": format!("user{n}"),
                "email": format!("user{n}@clinic.test"),
                "password": PASSWORD,
            }))
            .dispatch();
        let response = tokio::time::timeout(Duration::from_secs(5), request)
            .await
            .expect("request finished while the audit writer hangs");
        assert_eq!(response.status(), Status::Created);
    }
}

#[rocket::async_test]
async fn slow_store_maps_to_service_unavailable() {
    let client = TestRocketBuilder::new()
        .with_users(Arc::new(SlowUsers))
        .with_store_config(StoreConfig {
            context_timeout: Duration::from_millis(50),
        })
        .async_client()
        .await;

    let response = client
        .post("/api/v1/login")
        .json(&json!({ "email": "doc@clinic.test", "password": PASSWORD }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::ServiceUnavailable);
    let body: ErrorResponse = response.into_json().await.expect("error body");
    assert_eq!(body.error, "ServiceUnavailable");
}
