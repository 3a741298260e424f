//! Authentication gate and the request-scoped context it populates.

use std::sync::OnceLock;

use rocket::Request;
use rocket::request::Outcome;
use rocket_okapi::okapi::openapi3::{
    Object, SecurityRequirement, SecurityScheme, SecuritySchemeData,
};
use rocket_okapi::request::RequestHeaderInput;
use uuid::Uuid;

use crate::auth::roles::Role;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Identity established by a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedActor {
    pub id: Uuid,
    pub role: Role,
}

/// Per-request security context.
///
/// The actor cell is written only by [`authenticate`], at most once per
/// request; everything else reads it. The denial cell keeps the first
/// rejection so catchers can render it.
#[derive(Default)]
pub struct RequestContext {
    outcome: OnceLock<AuthResult<AuthenticatedActor>>,
    denial: OnceLock<AuthError>,
}

impl RequestContext {
    pub fn of<'r>(request: &'r Request<'_>) -> &'r RequestContext {
        request.local_cache(RequestContext::default)
    }

    /// The verified actor, if the gate ran and succeeded.
    pub fn actor(&self) -> Option<&AuthenticatedActor> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().ok())
    }

    pub fn denial(&self) -> Option<&AuthError> {
        self.denial.get()
    }

    pub(crate) fn record_denial(&self, err: &AuthError) {
        let _ = self.denial.set(err.clone());
    }
}

/// Run the authentication gate for this request, or return its cached outcome.
pub fn authenticate<'r>(request: &'r Request<'_>) -> &'r AuthResult<AuthenticatedActor> {
    let context = RequestContext::of(request);
    context.outcome.get_or_init(|| {
        let outcome = verify_request(request);
        if let Err(err) = &outcome {
            log::debug!(
                "authentication rejected {} {}: {}",
                request.method(),
                request.uri(),
                err
            );
        }
        outcome
    })
}

fn verify_request(request: &Request<'_>) -> AuthResult<AuthenticatedActor> {
    let token = bearer_token_from_request(request)?;

    let auth_state = request
        .rocket()
        .state::<AuthState>()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let claims = auth_state.tokens.verify_access(token)?;
    Ok(AuthenticatedActor {
        id: claims.subject,
        role: claims.role,
    })
}

fn bearer_token_from_request<'r>(request: &'r Request<'_>) -> AuthResult<&'r str> {
    let header = request
        .headers()
        .get_one("Authorization")
        .ok_or(AuthError::MissingToken)?;
    parse_bearer(header)
}

/// Accepts exactly `"<scheme> <token>"` with a case-insensitive `Bearer` scheme.
pub fn parse_bearer(header: &str) -> AuthResult<&str> {
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() => {
            Ok(*token)
        }
        _ => Err(AuthError::MalformedHeader),
    }
}

pub(crate) fn reject<S>(request: &Request<'_>, err: AuthError) -> Outcome<S, AuthError> {
    RequestContext::of(request).record_denial(&err);
    Outcome::Error((err.status(), err))
}

pub(crate) fn bearer_security_input() -> RequestHeaderInput {
    let scheme = SecurityScheme {
        description: Some("Access token issued by /login, /register or /refresh.".to_owned()),
        data: SecuritySchemeData::Http {
            scheme: "bearer".to_owned(),
            bearer_format: Some("JWT".to_owned()),
        },
        extensions: Object::default(),
    };
    let mut requirement = SecurityRequirement::new();
    requirement.insert("BearerAuth".to_owned(), Vec::new());
    RequestHeaderInput::Security("BearerAuth".to_owned(), scheme, requirement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bearer_in_any_case() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi").expect("valid"), "abc.def.ghi");
        assert_eq!(parse_bearer("bearer abc").expect("valid"), "abc");
        assert_eq!(parse_bearer("BEARER abc").expect("valid"), "abc");
    }

    #[test]
    fn rejects_anything_but_two_parts() {
        for header in [
            "",
            "Bearer",
            "Bearer ",
            "Bearer a b",
            "Bearer  a",
            "Basic dXNlcjpwYXNz",
            "Token abc",
            "abc",
        ] {
            assert!(
                matches!(parse_bearer(header), Err(AuthError::MalformedHeader)),
                "{header:?} should be malformed"
            );
        }
    }
}
