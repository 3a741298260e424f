use clinic_api::routes::health::HealthResponse;
use clinic_api::test_support::TestRocketBuilder;
use rocket::http::Status;

#[test]
fn health_endpoint_is_public() {
    let client = TestRocketBuilder::new().blocking_client();

    let response = client.get("/api/v1/health").dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: HealthResponse = response.into_json().expect("valid JSON payload");
    assert_eq!(payload.status, "ok");
}

#[test]
fn openapi_document_lists_clinic_routes() {
    let client = TestRocketBuilder::new().blocking_client();

    let response = client.get("/api/v1/openapi.json").dispatch();
    assert_eq!(response.status(), Status::Ok);

    let body = response.into_string().expect("openapi body");
    assert!(body.contains("/patients/doctor/{doctor_id}"));
    assert!(body.contains("BearerAuth"));
}

#[test]
fn unknown_paths_render_json_errors() {
    let client = TestRocketBuilder::new().blocking_client();

    let response = client.get("/api/v1/nothing-here").dispatch();
    assert_eq!(response.status(), Status::NotFound);

    let body: serde_json::Value = response.into_json().expect("json error body");
    assert_eq!(body["error"], "NotFound");
}
