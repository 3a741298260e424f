use std::fmt;

use crate::auth::passwords::HashCost;
use crate::auth::roles::{Role, RoleSet};
use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
///
/// Secrets and horizons are immutable after load; the whole struct is handed
/// to [`crate::auth::AuthState`] once at ignite.
#[derive(Clone)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub access_token_expiry_hours: i64,
    pub refresh_token_secret: String,
    pub refresh_token_expiry_hours: i64,
    pub password_cost: HashCost,
    /// Roles the public registration endpoint may create.
    pub self_registration_roles: RoleSet,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("access_token_expiry_hours", &self.access_token_expiry_hours)
            .field("refresh_token_secret", &"<redacted>")
            .field("refresh_token_expiry_hours", &self.refresh_token_expiry_hours)
            .field("password_cost", &self.password_cost)
            .field("self_registration_roles", &self.self_registration_roles)
            .finish()
    }
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AuthResult<Self> {
        let access_token_secret = required(&lookup, "ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = required(&lookup, "REFRESH_TOKEN_SECRET")?;
        if access_token_secret == refresh_token_secret {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".into(),
            ));
        }

        let access_token_expiry_hours = positive_hours(&lookup, "ACCESS_TOKEN_EXPIRY_HOUR")?;
        let refresh_token_expiry_hours = positive_hours(&lookup, "REFRESH_TOKEN_EXPIRY_HOUR")?;

        let iterations = required(&lookup, "PASSWORD_HASH_COST")?
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|cost| *cost >= 1)
            .ok_or_else(|| AuthError::Config("PASSWORD_HASH_COST must be an integer >= 1".into()))?;
        let memory_kib = match lookup("PASSWORD_HASH_MEMORY_KIB") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                AuthError::Config("PASSWORD_HASH_MEMORY_KIB must be an integer".into())
            })?,
            None => HashCost::default().memory_kib,
        };

        let self_registration_roles = match lookup("SELF_REGISTRATION_ROLES") {
            Some(raw) => RoleSet::parse_list(&raw)
                .map_err(|err| AuthError::Config(format!("SELF_REGISTRATION_ROLES: {err}")))?,
            None => RoleSet::of(&[Role::Patient]),
        };

        Ok(Self {
            access_token_secret,
            access_token_expiry_hours,
            refresh_token_secret,
            refresh_token_expiry_hours,
            password_cost: HashCost {
                iterations,
                memory_kib,
            },
            self_registration_roles,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AuthResult<String> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AuthError::Config(format!("{key} is required")))
}

/// Longest accepted token horizon: ten years.
pub const MAX_EXPIRY_HOURS: i64 = 10 * 366 * 24;

fn positive_hours(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AuthResult<i64> {
    required(lookup, key)?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| (1..=MAX_EXPIRY_HOURS).contains(hours))
        .ok_or_else(|| {
            AuthError::Config(format!(
                "{key} must be between 1 and {MAX_EXPIRY_HOURS} hours"
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const COMPLETE: &[(&str, &str)] = &[
        ("ACCESS_TOKEN_SECRET", "access"),
        ("ACCESS_TOKEN_EXPIRY_HOUR", "2"),
        ("REFRESH_TOKEN_SECRET", "refresh"),
        ("REFRESH_TOKEN_EXPIRY_HOUR", "168"),
        ("PASSWORD_HASH_COST", "3"),
    ];

    #[test]
    fn loads_complete_configuration() {
        let config = AuthConfig::from_lookup(env(COMPLETE)).expect("valid config");
        assert_eq!(config.access_token_expiry_hours, 2);
        assert_eq!(config.refresh_token_expiry_hours, 168);
        assert_eq!(config.password_cost.iterations, 3);
        assert_eq!(config.password_cost.memory_kib, 19 * 1024);
        assert_eq!(config.self_registration_roles, RoleSet::of(&[Role::Patient]));
    }

    #[test]
    fn every_required_variable_is_fatal_when_missing() {
        for (missing, _) in COMPLETE {
            let pairs: Vec<(&str, &str)> = COMPLETE
                .iter()
                .copied()
                .filter(|(key, _)| key != missing)
                .collect();
            let err = AuthConfig::from_lookup(env(&pairs)).expect_err("must fail");
            assert!(err.to_string().contains(missing), "{err} should name {missing}");
        }
    }

    #[test]
    fn rejects_shared_secret() {
        let mut pairs = COMPLETE.to_vec();
        pairs[2] = ("REFRESH_TOKEN_SECRET", "access");
        assert!(AuthConfig::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn rejects_non_positive_expiry_and_zero_cost() {
        let mut pairs = COMPLETE.to_vec();
        pairs[1] = ("ACCESS_TOKEN_EXPIRY_HOUR", "0");
        assert!(AuthConfig::from_lookup(env(&pairs)).is_err());

        let mut pairs = COMPLETE.to_vec();
        pairs[4] = ("PASSWORD_HASH_COST", "0");
        assert!(AuthConfig::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn rejects_expiry_beyond_the_maximum_horizon() {
        let mut pairs = COMPLETE.to_vec();
        pairs[3] = ("REFRESH_TOKEN_EXPIRY_HOUR", "100000000000");
        let err = AuthConfig::from_lookup(env(&pairs)).expect_err("horizon too long");
        assert!(err.to_string().contains("REFRESH_TOKEN_EXPIRY_HOUR"));

        let longest = MAX_EXPIRY_HOURS.to_string();
        let mut pairs = COMPLETE.to_vec();
        pairs[1] = ("ACCESS_TOKEN_EXPIRY_HOUR", longest.as_str());
        let config = AuthConfig::from_lookup(env(&pairs)).expect("ten years is accepted");
        assert_eq!(config.access_token_expiry_hours, MAX_EXPIRY_HOURS);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AuthConfig::from_lookup(env(COMPLETE)).expect("valid config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("\"access\""));
        assert!(rendered.contains("<redacted>"));
    }
}
