//! Error catchers so that guard failures render the same JSON body as handlers.

use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request};

use crate::auth::guards::RequestContext;
use crate::error::ErrorResponse;

#[catch(default)]
fn default_catcher(status: Status, request: &Request<'_>) -> status::Custom<Json<ErrorResponse>> {
    let body = match RequestContext::of(request).denial() {
        Some(denial) if denial.status() == status => {
            ErrorResponse::new(denial.kind(), denial.public_message())
        }
        _ => generic_body(status),
    };
    status::Custom(status, Json(body))
}

fn generic_body(status: Status) -> ErrorResponse {
    let (kind, message) = match status.code {
        400 => ("BadRequest", "malformed request"),
        401 => ("Unauthorized", "authentication required"),
        403 => ("Forbidden", "Access denied. You don't have permission to access this resource."),
        404 => ("NotFound", "resource not found"),
        422 => ("UnprocessableEntity", "request body could not be parsed"),
        503 => ("ServiceUnavailable", "service temporarily unavailable"),
        code if code >= 500 => ("InternalError", "internal server error"),
        _ => ("Error", status.reason_lossy()),
    };
    ErrorResponse::new(kind, message)
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}
