//! Pluggable password hashing.
//!
//! The orchestrator only sees this trait, so the slow-hash primitive can be
//! swapped without touching registration or login. Hashing runs on a
//! blocking thread; see `service.rs`.

use anyhow::{Context, Result};

/// Work factor matching the production deployment.
pub const BCRYPT_COST: u32 = 12;

pub trait PasswordHasher: Send + Sync {
    /// Produce a salted one-way digest of `password`.
    fn hash(&self, password: &str) -> Result<String>;

    /// Check `password` against a stored digest.
    fn verify(&self, password: &str, digest: &str) -> Result<bool>;
}

#[derive(Clone, Copy, Debug)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    #[must_use]
    pub const fn new() -> Self {
        Self { cost: BCRYPT_COST }
    }

    #[must_use]
    pub const fn with_cost(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, self.cost).context("failed to hash password")
    }

    fn verify(&self, password: &str, digest: &str) -> Result<bool> {
        bcrypt::verify(password, digest).context("failed to verify password")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the tests fast; production uses BCRYPT_COST.
    fn hasher() -> BcryptHasher {
        BcryptHasher::with_cost(4)
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let hasher = hasher();
        let digest = hasher.hash("Abcd1234").unwrap();
        assert_ne!(digest, "Abcd1234");
        assert!(hasher.verify("Abcd1234", &digest).unwrap());
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let hasher = hasher();
        let digest = hasher.hash("Abcd1234").unwrap();
        assert!(!hasher.verify("Abcd1235", &digest).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let hasher = hasher();
        let first = hasher.hash("Abcd1234").unwrap();
        let second = hasher.hash("Abcd1234").unwrap();
        assert_ne!(first, second, "salted digests must differ");
    }
}
