//! Authentication and authorization: configuration, credential handling,
//! token codec, Rocket request guards, route allow-lists and HTTP handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod policy;
pub mod responses;
pub mod roles;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthenticatedActor, RequestContext};
pub use jwt::{TokenCodec, TokenError, TokenPair};
pub use passwords::{HashCost, PasswordService};
pub use policy::{AccessPolicy, Authorized};
pub use roles::{Role, RoleSet};

/// Shared authentication services, managed by Rocket.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub passwords: Arc<PasswordService>,
    pub tokens: Arc<TokenCodec>,
}

impl AuthState {
    pub fn from_config(config: AuthConfig) -> AuthResult<Self> {
        let passwords = PasswordService::new(config.password_cost)?;
        let tokens = TokenCodec::from_config(&config);
        Ok(Self {
            config,
            passwords: Arc::new(passwords),
            tokens: Arc::new(tokens),
        })
    }
}
