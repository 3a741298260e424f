use rocket::http::Status;
use thiserror::Error;

use crate::auth::jwt::TokenError;
use crate::auth::roles::Role;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingToken,
    #[error("authorization header must be of the form 'Bearer <token>'")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("token subject no longer exists")]
    UnknownSubject,
    #[error("User already exists with the given email")]
    EmailTaken,
    #[error("role '{0}' cannot be self-registered")]
    RegistrationNotAllowed(Role),
    #[error("Access denied. You don't have permission to access this resource.")]
    Forbidden,
    #[error("no authenticated actor in request context")]
    MissingActor,
    #[error("route {0} has no access policy")]
    UnknownRoute(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::MissingToken
            | AuthError::MalformedHeader
            | AuthError::InvalidToken(_)
            | AuthError::InvalidCredentials
            | AuthError::UnknownSubject => Status::Unauthorized,
            AuthError::EmailTaken => Status::Conflict,
            AuthError::RegistrationNotAllowed(_) | AuthError::Forbidden => Status::Forbidden,
            AuthError::MissingActor
            | AuthError::UnknownRoute(_)
            | AuthError::Config(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }

    /// Short machine-readable kind used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MissingToken",
            AuthError::MalformedHeader => "MalformedHeader",
            AuthError::InvalidToken(_) => "InvalidToken",
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::UnknownSubject => "InvalidToken",
            AuthError::EmailTaken => "Conflict",
            AuthError::RegistrationNotAllowed(_) | AuthError::Forbidden => "Forbidden",
            AuthError::MissingActor
            | AuthError::UnknownRoute(_)
            | AuthError::Config(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => "InternalError",
        }
    }

    /// Message safe to hand back to a client.
    pub fn public_message(&self) -> String {
        if self.status() == Status::InternalServerError {
            "internal authorization error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_unauthorized_and_role_failures_forbidden() {
        assert_eq!(AuthError::MissingToken.status(), Status::Unauthorized);
        assert_eq!(AuthError::MalformedHeader.status(), Status::Unauthorized);
        assert_eq!(
            AuthError::InvalidToken(TokenError::Expired).status(),
            Status::Unauthorized
        );
        assert_eq!(AuthError::Forbidden.status(), Status::Forbidden);
        assert_eq!(AuthError::MissingActor.status(), Status::InternalServerError);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AuthError::UnknownRoute("GET /api/v1/secret".into());
        assert_eq!(err.public_message(), "internal authorization error");
        assert_eq!(AuthError::InvalidCredentials.public_message(), "Invalid credentials");
    }
}
