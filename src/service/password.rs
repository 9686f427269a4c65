//! # Password hashing with bcrypt
//!
//! [`BcryptHasher`] produces salted, deliberately slow one-way hashes in the
//! modular crypt format (`$2b$10$...`). The cost defaults to 10 rounds,
//! matching hashes already stored by other `bcrypt` users.

use super::error::{Result, ServiceError};

pub const DEFAULT_COST: u32 = 10;
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// One-way password hashing used before a password is stored.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Cost must lie in bcrypt's supported range (4..=31).
    pub fn new(cost: u32) -> Result<Self> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(ServiceError::Hash(format!(
                "cost {} outside {}..={}",
                cost,
                MIN_COST,
                MAX_COST
            )));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| ServiceError::Hash(e.to_string()))
    }
}
