use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// Argon2id work factors. Hashes embed their own parameters, so changing the
/// cost only affects newly created hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub iterations: u32,
    pub memory_kib: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            iterations: 2,
            memory_kib: 19 * 1024,
        }
    }
}

/// Credential verifier: salted one-way hashing of account passwords.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    // Verified against when an account does not exist so both login paths pay
    // the same hashing cost.
    decoy_hash: String,
}

impl PasswordService {
    pub fn new(cost: HashCost) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(cost.memory_kib);
        builder.t_cost(cost.iterations);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let decoy_hash = hash_with(&argon2, "decoy-password-never-matches")?;
        Ok(Self { argon2, decoy_hash })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        hash_with(&self.argon2, password)
    }

    /// `Ok(false)` on mismatch; an unparseable stored hash is an error.
    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Burn one verification for an unknown account. Always reports no match.
    pub fn verify_decoy(&self, password: &str) -> bool {
        let _ = self.verify_password(password, &self.decoy_hash);
        false
    }
}

fn hash_with(argon2: &Argon2<'static>, password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(AuthError::from)?
        .to_string();
    Ok(hash)
}
