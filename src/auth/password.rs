/// Password Hashing and Verification
///
/// bcrypt only looks at the first 72 bytes of its input. Longer passwords
/// are replaced by the hex SHA-256 digest of their UTF-8 bytes before
/// hashing and before verification, so every byte contributes.

use bcrypt::{hash, verify, DEFAULT_COST};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Input ceiling of the bcrypt primitive, in bytes
pub const BCRYPT_MAX_INPUT_BYTES: usize = 72;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password with bcrypt after length normalization.
    ///
    /// # Errors
    /// Returns an internal error if bcrypt rejects the cost factor
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let normalized = normalize_password(password);
        hash(normalized.as_bytes(), self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash.
    ///
    /// A stored value that is not a bcrypt hash verifies as `false`.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        let normalized = normalize_password(password);
        match verify(normalized.as_bytes(), password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("Stored password hash could not be parsed: {}", e);
                false
            }
        }
    }
}

/// Hashing seam used by the authentication flow.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AppError>;

    fn verify(&self, password: &str, password_hash: &str) -> bool;
}

impl CredentialHasher for PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, AppError> {
        PasswordHasher::hash(self, password)
    }

    fn verify(&self, password: &str, password_hash: &str) -> bool {
        PasswordHasher::verify(self, password, password_hash)
    }
}

/// Passwords over the bcrypt ceiling become their 64-character hex digest.
fn normalize_password(password: &str) -> String {
    if password.len() > BCRYPT_MAX_INPUT_BYTES {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    } else {
        password.to_string()
    }
}
