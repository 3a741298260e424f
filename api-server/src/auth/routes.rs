use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::audit::{AuditAction, AuditNotifier};
use crate::auth::policy::Authorized;
use crate::auth::responses::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse};
use crate::auth::roles::Role;
use crate::auth::{AuthError, AuthState};
use crate::error::ApiError;
use crate::models::{NewUser, User, UserProfile};
use crate::store::{Store, StoreError};
use crate::validation::{is_valid_email, normalize_email};

fn issue_tokens(state: &AuthState, user: &User) -> Result<TokenResponse, ApiError> {
    state
        .tokens
        .issue_pair(user.id, user.role)
        .map(TokenResponse::from)
        .map_err(|err| ApiError::InternalError(format!("token signing failed: {err}")))
}

/// Create an account and return a fresh token pair.
#[openapi(tag = "Auth")]
#[post("/register", data = "<payload>")]
pub async fn register(
    state: &State<AuthState>,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<RegisterRequest>,
) -> Result<status::Custom<Json<TokenResponse>>, ApiError> {
    let RegisterRequest {
        username,
        email,
        password,
        role,
    } = payload.into_inner();

    let username = username.trim().to_string();
    let email = normalize_email(&email);
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("invalid email format".to_string()));
    }
    if password.is_empty() {
        return Err(ApiError::BadRequest("password is required".to_string()));
    }

    let role = role.unwrap_or(Role::Patient);
    if !state.config.self_registration_roles.contains(role) {
        return Err(AuthError::RegistrationNotAllowed(role).into());
    }

    if store.run(store.users.find_user_by_email(&email)).await?.is_some() {
        return Err(AuthError::EmailTaken.into());
    }

    let password_hash = state.passwords.hash_password(&password)?;
    let new_user = NewUser {
        username,
        email,
        password_hash,
        role,
    };
    let user = match store.run(store.users.create_user(new_user)).await {
        Ok(user) => user,
        // lost a race with a concurrent registration
        Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken.into()),
        Err(err) => return Err(err.into()),
    };

    let tokens = issue_tokens(state, &user)?;
    audit.log(
        Some(user.id),
        AuditAction::UserRegister,
        format!("User registered with ID: {}", user.id),
    );
    log::info!("registered {} user {}", user.role, user.id);

    Ok(status::Custom(Status::Created, Json(tokens)))
}

/// Exchange e-mail and password for a token pair.
///
/// Unknown e-mails and wrong passwords produce the same 401 body.
#[openapi(tag = "Auth")]
#[post("/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let Some(user) = store.run(store.users.find_user_by_email(&email)).await? else {
        // Keep the timing of the unknown-email path close to a real verify.
        state.passwords.verify_decoy(&payload.password);
        audit.log(
            None,
            AuditAction::UserLoginFailed,
            format!("Failed login attempt for email: {email}"),
        );
        log::debug!("login rejected: unknown email");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !state
        .passwords
        .verify_password(&payload.password, &user.password_hash)?
    {
        audit.log(
            Some(user.id),
            AuditAction::UserLoginFailed,
            format!("Failed login attempt for user {}", user.id),
        );
        log::debug!("login rejected: wrong password for {}", user.id);
        return Err(AuthError::InvalidCredentials.into());
    }

    let tokens = issue_tokens(state, &user)?;
    audit.log(
        Some(user.id),
        AuditAction::UserLoginSuccess,
        format!("User {} logged in successfully", user.id),
    );

    Ok(Json(tokens))
}

/// Trade a refresh token for a new pair carrying the user's current role.
#[openapi(tag = "Auth")]
#[post("/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    store: &State<Store>,
    audit: &State<AuditNotifier>,
    payload: Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let claims = state
        .tokens
        .verify_refresh(&payload.refresh_token)
        .map_err(AuthError::from)?;

    let Some(user) = store.run(store.users.find_user(claims.subject)).await? else {
        return Err(AuthError::UnknownSubject.into());
    };

    let tokens = issue_tokens(state, &user)?;
    audit.log(
        Some(user.id),
        AuditAction::TokenRefresh,
        format!("Tokens refreshed for user {}", user.id),
    );

    Ok(Json(tokens))
}

/// Profile of the authenticated caller, with the patient or doctor record
/// linked to the account so clients can address their own scoped routes.
#[openapi(tag = "Auth")]
#[get("/me")]
pub async fn me(auth: Authorized, store: &State<Store>) -> Result<Json<UserProfile>, ApiError> {
    let user = store
        .run(store.users.find_user(auth.id()))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    let mut profile = UserProfile::from(user);
    match profile.role {
        Role::Patient => {
            profile.patient_id = store
                .run(store.patients.find_patient_by_user(profile.id))
                .await?
                .map(|patient| patient.id);
        }
        Role::Doctor => {
            profile.doctor_id = store
                .run(store.doctors.find_doctor_by_user(profile.id))
                .await?
                .map(|doctor| doctor.id);
        }
        Role::Admin => {}
    }

    Ok(Json(profile))
}
