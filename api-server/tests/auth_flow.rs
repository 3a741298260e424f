mod common;

use clinic_api::auth::jwt::TokenError;
use clinic_api::auth::responses::TokenResponse;
use clinic_api::auth::roles::Role;
use clinic_api::auth::TokenCodec;
use clinic_api::error::ErrorResponse;
use clinic_api::models::UserProfile;
use clinic_api::store::MemoryStore;
use clinic_api::test_support::{TestRocketBuilder, bearer};
use rocket::http::Status;
use rocket::local::asynchronous::Client;
use serde_json::json;

use common::{PASSWORD, config, seed_doctor, seed_patient, seed_user, token_for};

async fn client() -> (Client, MemoryStore) {
    let store = MemoryStore::new();
    let client = TestRocketBuilder::new()
        .with_store(store.clone())
        .async_client()
        .await;
    (client, store)
}

async fn register(client: &Client, email: &str) -> (Status, serde_json::Value) {
    let response = client
        .post("/api/v1/register")
        .json(&json!({
            "username": "maria",
            "email": email,
            "password": PASSWORD,
        }))
        .dispatch()
        .await;
    let status = response.status();
    (status, response.into_json().await.expect("json body"))
}

#[rocket::async_test]
async fn register_issues_patient_tokens_and_rejects_duplicates() {
    let (client, _store) = client().await;

    let (status, body) = register(&client, "maria@clinic.test").await;
    assert_eq!(status, Status::Created);
    let tokens: TokenResponse = serde_json::from_value(body).expect("token pair");

    let codec = TokenCodec::from_config(&config());
    let claims = codec.verify_access(&tokens.access_token).expect("valid access token");
    assert_eq!(claims.role, Role::Patient);

    let (status, body) = register(&client, "Maria@Clinic.test").await;
    assert_eq!(status, Status::Conflict);
    let error: ErrorResponse = serde_json::from_value(body).expect("error body");
    assert_eq!(error.error, "Conflict");
    assert_eq!(error.message, "User already exists with the given email");
}

#[rocket::async_test]
async fn register_validates_input_and_restricts_roles() {
    let (client, _store) = client().await;

    let (status, _) = register(&client, "not-an-email").await;
    assert_eq!(status, Status::BadRequest);

    let response = client
        .post("/api/v1/register")
        .json(&json!({
            "username": "mallory",
            "email": "mallory@clinic.test",
            "password": PASSWORD,
            "role": "admin",
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn login_distinguishes_nothing_but_success() {
    let (client, store) = client().await;
    let user = seed_user(&store, "doc@clinic.test", Role::Doctor).await;

    let wrong_password = client
        .post("/api/v1/login")
        .json(&json!({ "email": "doc@clinic.test", "password": "nope" }))
        .dispatch()
        .await;
    assert_eq!(wrong_password.status(), Status::Unauthorized);
    let wrong_body: ErrorResponse = wrong_password.into_json().await.expect("error body");
    assert_eq!(wrong_body.message, "Invalid credentials");

    let unknown_email = client
        .post("/api/v1/login")
        .json(&json!({ "email": "ghost@clinic.test", "password": "nope" }))
        .dispatch()
        .await;
    assert_eq!(unknown_email.status(), Status::Unauthorized);
    let unknown_body: ErrorResponse = unknown_email.into_json().await.expect("error body");
    assert_eq!(unknown_body.error, wrong_body.error);
    assert_eq!(unknown_body.message, wrong_body.message);

    let ok = client
        .post("/api/v1/login")
        .json(&json!({ "email": "DOC@clinic.test", "password": PASSWORD }))
        .dispatch()
        .await;
    assert_eq!(ok.status(), Status::Ok);
    let tokens: TokenResponse = ok.into_json().await.expect("token pair");
    assert_ne!(tokens.access_token, tokens.refresh_token);

    let codec = TokenCodec::from_config(&config());
    let access = codec.verify_access(&tokens.access_token).expect("access");
    let refresh = codec.verify_refresh(&tokens.refresh_token).expect("refresh");
    assert_eq!(access.subject, user.id);
    assert_eq!(access.role, Role::Doctor);
    assert_eq!(refresh.role, Role::Doctor);

    assert_eq!(
        codec.verify_refresh(&tokens.access_token),
        Err(TokenError::InvalidSignature)
    );
}

#[rocket::async_test]
async fn refresh_accepts_only_refresh_tokens() {
    let (client, _store) = client().await;
    let (_, body) = register(&client, "pat@clinic.test").await;
    let tokens: TokenResponse = serde_json::from_value(body).expect("token pair");

    let refreshed = client
        .post("/api/v1/refresh")
        .json(&json!({ "refreshToken": tokens.refresh_token }))
        .dispatch()
        .await;
    assert_eq!(refreshed.status(), Status::Ok);
    let pair: TokenResponse = refreshed.into_json().await.expect("token pair");
    assert!(
        TokenCodec::from_config(&config())
            .verify_access(&pair.access_token)
            .is_ok()
    );

    let misuse = client
        .post("/api/v1/refresh")
        .json(&json!({ "refreshToken": tokens.access_token }))
        .dispatch()
        .await;
    assert_eq!(misuse.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn me_returns_the_caller_profile() {
    let (client, _store) = client().await;
    let (_, body) = register(&client, "self@clinic.test").await;
    let tokens: TokenResponse = serde_json::from_value(body).expect("token pair");

    let response = client
        .get("/api/v1/me")
        .header(bearer(&tokens.access_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let profile: UserProfile = response.into_json().await.expect("profile");
    assert_eq!(profile.email, "self@clinic.test");
    assert_eq!(profile.role, Role::Patient);
    assert_eq!(profile.patient_id, None);
    assert_eq!(profile.doctor_id, None);

    let anonymous = client.get("/api/v1/me").dispatch().await;
    assert_eq!(anonymous.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn me_links_the_callers_own_records() {
    let (client, store) = client().await;
    let doctor_user = seed_user(&store, "doc@clinic.test", Role::Doctor).await;
    let patient_user = seed_user(&store, "pat@clinic.test", Role::Patient).await;
    let admin = seed_user(&store, "admin@clinic.test", Role::Admin).await;
    let doctor = seed_doctor(&store, &doctor_user, "CRM-SP-3001").await;
    let patient = seed_patient(&store, &patient_user, "52998224725").await;

    let profile_of = |token: String| {
        let client = &client;
        async move {
            let response = client.get("/api/v1/me").header(bearer(&token)).dispatch().await;
            assert_eq!(response.status(), Status::Ok);
            response.into_json::<UserProfile>().await.expect("profile")
        }
    };

    let as_doctor = profile_of(token_for(&doctor_user)).await;
    assert_eq!(as_doctor.doctor_id, Some(doctor.id));
    assert_eq!(as_doctor.patient_id, None);

    let as_patient = profile_of(token_for(&patient_user)).await;
    assert_eq!(as_patient.patient_id, Some(patient.id));
    assert_eq!(as_patient.doctor_id, None);

    let as_admin = profile_of(token_for(&admin)).await;
    assert_eq!((as_admin.patient_id, as_admin.doctor_id), (None, None));
}
