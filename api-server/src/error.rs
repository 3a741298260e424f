use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Store(StoreError),
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    InternalError(String),
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string()
        })
    }
}

impl ApiError {
    fn parts(self) -> (Status, &'static str, String) {
        match self {
            ApiError::Auth(err) => {
                if err.status() == Status::InternalServerError {
                    log::error!("auth failure: {}", err);
                } else {
                    log::debug!("auth rejection: {}", err);
                }
                (err.status(), err.kind(), err.public_message())
            }
            ApiError::Store(err) => store_parts(err),
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::Forbidden(msg) => {
                log::info!("forbidden: {}", msg);
                (Status::Forbidden, "Forbidden", msg)
            }
            ApiError::Conflict(msg) => {
                log::debug!("conflict: {}", msg);
                (Status::Conflict, "Conflict", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (
                    Status::InternalServerError,
                    "InternalError",
                    "internal server error".to_string(),
                )
            }
        }
    }
}

fn store_parts(err: StoreError) -> (Status, &'static str, String) {
    match err {
        StoreError::NotFound(entity) => (Status::NotFound, "NotFound", format!("{entity} not found")),
        StoreError::Conflict(msg) => {
            log::info!("store conflict: {}", msg);
            (Status::Conflict, "Conflict", "duplicate value".to_string())
        }
        StoreError::InvalidReference(msg) => {
            log::info!("invalid reference: {}", msg);
            (
                Status::BadRequest,
                "BadRequest",
                "referenced entity does not exist".to_string(),
            )
        }
        StoreError::Timeout(_) | StoreError::Unavailable(_) => {
            log::warn!("store unavailable: {}", err);
            (
                Status::ServiceUnavailable,
                "ServiceUnavailable",
                "service temporarily unavailable".to_string(),
            )
        }
        StoreError::Corrupt(_) | StoreError::Database(_) => {
            log::error!("storage error: {}", err);
            (
                Status::InternalServerError,
                "InternalError",
                "internal storage error".to_string(),
            )
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = self.parts();
        let json = ErrorResponse::new(error_type, message).to_json();

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Malformed input or dangling reference"),
            ("401", "Missing, malformed, invalid or expired access token"),
            ("403", "Authenticated actor lacks the required role or ownership"),
            ("404", "Resource not found"),
            ("409", "Uniqueness conflict"),
            ("500", "Internal error"),
            ("503", "Storage did not answer within the context timeout"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
