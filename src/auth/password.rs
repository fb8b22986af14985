/// Password Hashing and Verification
///
/// bcrypt with a tunable cost. Hashing is slow, so the async helpers move it
/// onto tokio's blocking pool and keep actix workers free.
///
/// Login must cost the same whether or not the email exists. The hasher
/// keeps a throwaway hash at its own cost to verify against when there is no
/// stored hash to check.

use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ConfigError};

const DUMMY_PASSWORD: &str = "bookshelf-no-such-account";

#[derive(Debug, Clone)]
pub struct CredentialHasher {
    cost: u32,
    dummy_hash: Arc<str>,
}

impl CredentialHasher {
    /// Build a hasher for bcrypt `cost`
    ///
    /// # Errors
    /// Returns a configuration error if bcrypt rejects the cost (valid range 4..=31)
    pub fn new(cost: u32) -> Result<Self, ConfigError> {
        let dummy_hash = hash(DUMMY_PASSWORD, cost).map_err(|e| {
            ConfigError::InvalidValue(format!("bcrypt cost {} rejected: {}", cost, e))
        })?;

        Ok(Self {
            cost,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hasher at `bcrypt::DEFAULT_COST`
    pub fn with_default_cost() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_COST)
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password using bcrypt with a fresh salt
    ///
    /// # Errors
    /// Returns error if bcrypt rejects the input
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash
    ///
    /// A wrong password is `false`. So is a stored hash bcrypt cannot parse.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        match verify(password, password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be verified");
                false
            }
        }
    }

    /// Spend one full verification on the throwaway hash. Always `false`.
    pub fn verify_absent(&self, password: &str) -> bool {
        let _ = verify(password, &self.dummy_hash);
        false
    }

    /// `hash` on the blocking thread pool
    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// `verify` on the blocking thread pool
    pub async fn verify_blocking(
        &self,
        password: String,
        password_hash: String,
    ) -> Result<bool, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }

    /// `verify_absent` on the blocking thread pool
    pub async fn verify_absent_blocking(&self, password: String) -> Result<bool, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_absent(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }
}
