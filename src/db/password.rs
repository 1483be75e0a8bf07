use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("password hashing error: {0}")]
    Hash(String),
}

impl From<argon2::password_hash::Error> for PasswordError {
    fn from(err: argon2::password_hash::Error) -> Self {
        PasswordError::Hash(err.to_string())
    }
}

/// Work factor for new hashes. Stored hashes carry their own parameters, so
/// changing this never invalidates existing accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
        }
    }
}

// Salt and digest of the decoy hash: "somesaltsomesalt" and 32 zero bytes.
const DECOY_SALT: &str = "c29tZXNhbHRzb21lc2FsdA";
const DECOY_DIGEST: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Argon2id hasher producing self-describing PHC strings.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, 1, None)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// Checks `password` against `stored` using the parameters recorded in
    /// `stored`. Unparsable hashes (e.g. archived accounts) never verify.
    pub fn verify(password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// A well-formed hash at this hasher's cost that no password verifies
    /// against. Verifying it costs as much as checking a real password.
    pub fn decoy(&self) -> String {
        format!(
            "$argon2id$v=19$m={},t={},p=1${DECOY_SALT}${DECOY_DIGEST}",
            self.params.m_cost(),
            self.params.t_cost()
        )
    }

    /// [`PasswordHasher::hash`] on the blocking pool.
    pub async fn hash_blocking(&self, password: &str) -> Result<String, PasswordError> {
        let hasher = self.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Hash(e.to_string()))?
    }

    /// [`PasswordHasher::verify`] on the blocking pool.
    pub async fn verify_blocking(password: &str, stored: &str) -> bool {
        let password = password.to_owned();
        let stored = stored.to_owned();
        tokio::task::spawn_blocking(move || Self::verify(&password, &stored))
            .await
            .unwrap_or(false)
    }
}
