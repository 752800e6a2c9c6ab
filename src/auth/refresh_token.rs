/// Refresh Token Ledger
///
/// Persisted record of every refresh token handed out. The ledger, not the
/// token's own `exp`, decides whether a refresh token may still be used:
/// an entry can be revoked long before its signed expiry.
///
/// Entries are keyed by the SHA-256 digest of the token string, so the
/// presented string is the lookup key while plaintext never rests in storage.
/// Entries are never purged; revoked and expired rows stay as history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Only ever flips from false to true
    pub revoked: bool,
}

impl LedgerEntry {
    /// Live means not revoked and not past the ledger's own expiry.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// `is_usable` over a lookup result; an absent entry is never usable.
pub fn is_usable(entry: Option<&LedgerEntry>, now: DateTime<Utc>) -> bool {
    entry.map_or(false, |entry| entry.is_usable(now))
}

/// Storage contract for the ledger.
#[async_trait]
pub trait RefreshLedger: Send + Sync {
    /// Persist a new entry.
    ///
    /// # Errors
    /// Conflict if the token string was recorded before
    async fn record(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, AppError>;

    async fn lookup(&self, token: &str) -> Result<Option<LedgerEntry>, AppError>;

    /// Mark the entry revoked. Returns true only when a live (not yet
    /// revoked) entry was found and flipped; absent or already revoked
    /// tokens are not an error.
    async fn revoke(&self, token: &str) -> Result<bool, AppError>;
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
