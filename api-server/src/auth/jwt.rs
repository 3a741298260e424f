//! Token codec: HS256 JWTs carrying `{sub, role, exp, iat}`.
//!
//! Access and refresh tokens are the same shape signed with different
//! secrets, so a token of one class never verifies as the other.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthConfig;
use crate::auth::roles::Role;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token is missing the '{0}' claim")]
    MissingClaim(&'static str),
    #[error("token could not be signed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize)]
struct TokenClaims<'a> {
    sub: String,
    role: &'a str,
    exp: i64,
    iat: i64,
}

// Decoded loosely so an absent claim is reported as such rather than as a
// generic deserialization failure.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    role: Option<String>,
    exp: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity asserted by a token whose signature and expiry both checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: Uuid,
    pub role: Role,
}

pub fn issue_token(
    subject: Uuid,
    role: Role,
    secret: &[u8],
    ttl: Duration,
    issued_at: DateTime<Utc>,
) -> Result<SignedToken, TokenError> {
    let expires_at = issued_at
        .checked_add_signed(ttl)
        .ok_or_else(|| TokenError::Signing("expiry is out of range".to_string()))?;
    let claims = TokenClaims {
        sub: subject.to_string(),
        role: role.as_str(),
        exp: expires_at.timestamp(),
        iat: issued_at.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|err| TokenError::Signing(err.to_string()))?;

    Ok(SignedToken { token, expires_at })
}

pub fn parse_and_verify(token: &str, secret: &[u8]) -> Result<VerifiedClaims, TokenError> {
    let data = decode::<RawClaims>(token, &DecodingKey::from_secret(secret), &validation())
        .map_err(|err| map_decode_error(err.kind()))?;
    let exp = data.claims.exp.ok_or(TokenError::MissingClaim("exp"))?;
    // jsonwebtoken still accepts the second in which `exp == now`.
    if exp <= Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }

    let subject = data
        .claims
        .sub
        .ok_or(TokenError::MissingClaim("sub"))?
        .parse::<Uuid>()
        .map_err(|_| TokenError::Malformed)?;
    let role = data
        .claims
        .role
        .ok_or(TokenError::MissingClaim("role"))?
        .parse::<Role>()
        .map_err(|_| TokenError::Malformed)?;

    Ok(VerifiedClaims { subject, role })
}

pub fn extract_subject(token: &str, secret: &[u8]) -> Result<Uuid, TokenError> {
    parse_and_verify(token, secret).map(|claims| claims.subject)
}

pub fn extract_role(token: &str, secret: &[u8]) -> Result<Role, TokenError> {
    parse_and_verify(token, secret).map(|claims| claims.role)
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

fn map_decode_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(claim) if claim == "exp" => TokenError::MissingClaim("exp"),
        _ => TokenError::Malformed,
    }
}

struct TokenClass {
    secret: Vec<u8>,
    expiry_hours: i64,
}

impl TokenClass {
    fn issue(&self, subject: Uuid, role: Role) -> Result<SignedToken, TokenError> {
        let ttl = Duration::try_hours(self.expiry_hours)
            .ok_or_else(|| TokenError::Signing("expiry horizon is out of range".to_string()))?;
        issue_token(subject, role, &self.secret, ttl, Utc::now())
    }
}

/// Access/refresh token pair handed out on login, registration and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: SignedToken,
    pub refresh: SignedToken,
}

/// Codec bound to the configured secrets and horizons.
pub struct TokenCodec {
    access: TokenClass,
    refresh: TokenClass,
}

impl TokenCodec {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            access: TokenClass {
                secret: config.access_token_secret.as_bytes().to_vec(),
                expiry_hours: config.access_token_expiry_hours,
            },
            refresh: TokenClass {
                secret: config.refresh_token_secret.as_bytes().to_vec(),
                expiry_hours: config.refresh_token_expiry_hours,
            },
        }
    }

    pub fn issue_access(&self, subject: Uuid, role: Role) -> Result<SignedToken, TokenError> {
        self.access.issue(subject, role)
    }

    pub fn issue_refresh(&self, subject: Uuid, role: Role) -> Result<SignedToken, TokenError> {
        self.refresh.issue(subject, role)
    }

    pub fn issue_pair(&self, subject: Uuid, role: Role) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue_access(subject, role)?,
            refresh: self.issue_refresh(subject, role)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<VerifiedClaims, TokenError> {
        parse_and_verify(token, &self.access.secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<VerifiedClaims, TokenError> {
        parse_and_verify(token, &self.refresh.secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &[u8] = b"access-secret-for-tests";
    const REFRESH_SECRET: &[u8] = b"refresh-secret-for-tests";

    fn sign_raw(payload: serde_json::Value, secret: &[u8]) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(secret),
        )
        .expect("encode raw token")
    }

    #[test]
    fn issues_and_verifies_tokens() {
        let subject = Uuid::new_v4();
        let signed = issue_token(subject, Role::Doctor, ACCESS_SECRET, Duration::hours(1), Utc::now())
            .expect("issue token");

        let claims = parse_and_verify(&signed.token, ACCESS_SECRET).expect("verify token");
        assert_eq!(claims.subject, subject);
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(extract_subject(&signed.token, ACCESS_SECRET), Ok(subject));
        assert_eq!(extract_role(&signed.token, ACCESS_SECRET), Ok(Role::Doctor));
    }

    #[test]
    fn token_is_valid_just_inside_the_horizon_and_expired_just_past_it() {
        let ttl = Duration::hours(2);
        let subject = Uuid::new_v4();

        let fresh_enough = Utc::now() - ttl + Duration::seconds(60);
        let signed = issue_token(subject, Role::Patient, ACCESS_SECRET, ttl, fresh_enough)
            .expect("issue token");
        assert!(parse_and_verify(&signed.token, ACCESS_SECRET).is_ok());

        let too_old = Utc::now() - ttl - Duration::seconds(60);
        let signed =
            issue_token(subject, Role::Patient, ACCESS_SECRET, ttl, too_old).expect("issue token");
        assert_eq!(
            parse_and_verify(&signed.token, ACCESS_SECRET),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn token_is_expired_in_the_second_of_its_exp() {
        let now = Utc::now().timestamp();
        let token = sign_raw(
            serde_json::json!({
                "sub": Uuid::new_v4().to_string(),
                "role": "patient",
                "exp": now,
                "iat": now - 60,
            }),
            ACCESS_SECRET,
        );
        assert_eq!(parse_and_verify(&token, ACCESS_SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn unrepresentable_expiry_is_a_signing_error() {
        let far_future = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let result = issue_token(
            Uuid::new_v4(),
            Role::Admin,
            ACCESS_SECRET,
            Duration::hours(2),
            far_future,
        );
        assert!(matches!(result, Err(TokenError::Signing(_))));

        let mut config = crate::test_support::test_auth_config();
        config.refresh_token_expiry_hours = 100_000_000_000_000;
        let codec = TokenCodec::from_config(&config);
        assert!(matches!(
            codec.issue_pair(Uuid::new_v4(), Role::Patient),
            Err(TokenError::Signing(_))
        ));
    }

    #[test]
    fn secrets_are_isolated_between_token_classes() {
        let subject = Uuid::new_v4();
        let access = issue_token(subject, Role::Admin, ACCESS_SECRET, Duration::hours(1), Utc::now())
            .expect("issue access");
        let refresh =
            issue_token(subject, Role::Admin, REFRESH_SECRET, Duration::hours(1), Utc::now())
                .expect("issue refresh");

        assert_eq!(
            parse_and_verify(&access.token, REFRESH_SECRET),
            Err(TokenError::InvalidSignature)
        );
        assert_eq!(
            parse_and_verify(&refresh.token, ACCESS_SECRET),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let signed = issue_token(
            Uuid::new_v4(),
            Role::Patient,
            ACCESS_SECRET,
            Duration::hours(1),
            Utc::now(),
        )
        .expect("issue token");
        let forged_payload = sign_raw(
            serde_json::json!({
                "sub": Uuid::new_v4().to_string(),
                "role": "admin",
                "exp": Utc::now().timestamp() + 3600,
                "iat": Utc::now().timestamp(),
            }),
            b"attacker-secret",
        );

        let original: Vec<&str> = signed.token.split('.').collect();
        let forged: Vec<&str> = forged_payload.split('.').collect();
        let spliced = format!("{}.{}.{}", original[0], forged[1], original[2]);

        assert_eq!(
            parse_and_verify(&spliced, ACCESS_SECRET),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            parse_and_verify("definitely-not-a-jwt", ACCESS_SECRET),
            Err(TokenError::Malformed)
        );
        assert_eq!(parse_and_verify("", ACCESS_SECRET), Err(TokenError::Malformed));
    }

    #[test]
    fn missing_claims_are_reported() {
        let exp = Utc::now().timestamp() + 3600;
        let no_role = sign_raw(
            serde_json::json!({ "sub": Uuid::new_v4().to_string(), "exp": exp }),
            ACCESS_SECRET,
        );
        assert_eq!(
            parse_and_verify(&no_role, ACCESS_SECRET),
            Err(TokenError::MissingClaim("role"))
        );

        let no_sub = sign_raw(serde_json::json!({ "role": "admin", "exp": exp }), ACCESS_SECRET);
        assert_eq!(
            parse_and_verify(&no_sub, ACCESS_SECRET),
            Err(TokenError::MissingClaim("sub"))
        );

        let no_exp = sign_raw(
            serde_json::json!({ "sub": Uuid::new_v4().to_string(), "role": "admin" }),
            ACCESS_SECRET,
        );
        assert_eq!(
            parse_and_verify(&no_exp, ACCESS_SECRET),
            Err(TokenError::MissingClaim("exp"))
        );
    }

    #[test]
    fn unparseable_subject_or_role_never_yields_an_identity() {
        let exp = Utc::now().timestamp() + 3600;
        let bad_sub = sign_raw(
            serde_json::json!({ "sub": "42", "role": "admin", "exp": exp }),
            ACCESS_SECRET,
        );
        assert_eq!(
            parse_and_verify(&bad_sub, ACCESS_SECRET),
            Err(TokenError::Malformed)
        );

        let bad_role = sign_raw(
            serde_json::json!({ "sub": Uuid::new_v4().to_string(), "role": "root", "exp": exp }),
            ACCESS_SECRET,
        );
        assert_eq!(
            parse_and_verify(&bad_role, ACCESS_SECRET),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn codec_pairs_use_distinct_secrets() {
        let config = AuthConfig {
            access_token_secret: "a-secret".into(),
            access_token_expiry_hours: 1,
            refresh_token_secret: "r-secret".into(),
            refresh_token_expiry_hours: 24,
            password_cost: Default::default(),
            self_registration_roles: Default::default(),
        };
        let codec = TokenCodec::from_config(&config);
        let subject = Uuid::new_v4();
        let pair = codec.issue_pair(subject, Role::Patient).expect("pair");

        assert_ne!(pair.access.token, pair.refresh.token);
        assert!(pair.refresh.expires_at > pair.access.expires_at);
        assert_eq!(
            codec.verify_access(&pair.access.token).map(|c| c.subject),
            Ok(subject)
        );
        assert_eq!(
            codec.verify_refresh(&pair.refresh.token).map(|c| c.role),
            Ok(Role::Patient)
        );
        assert!(codec.verify_access(&pair.refresh.token).is_err());
        assert!(codec.verify_refresh(&pair.access.token).is_err());
    }
}
