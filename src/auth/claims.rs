/// JWT Claims
///
/// Access and refresh tokens carry distinct claim types. Only the access
/// claims hold a role; a refresh token never answers an authorization
/// question.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

/// Discriminator embedded in every token, checked on verification so a
/// token of one kind is never accepted as the other even under a shared key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims for access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    pub typ: TokenKind,
}

/// Claims for refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub typ: TokenKind,
    /// Random identifier; keeps two refresh tokens minted in the same second
    /// for the same user distinct.
    pub jti: String,
}

/// Common view over both claim types used by the codec.
pub trait TokenClaims: Serialize + for<'de> Deserialize<'de> {
    const KIND: TokenKind;

    fn kind(&self) -> TokenKind;
    fn expires_at_unix(&self) -> i64;

    fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.expires_at_unix(), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl TokenClaims for AccessClaims {
    const KIND: TokenKind = TokenKind::Access;

    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn expires_at_unix(&self) -> i64 {
        self.exp
    }
}

impl TokenClaims for RefreshClaims {
    const KIND: TokenKind = TokenKind::Refresh;

    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn expires_at_unix(&self) -> i64 {
        self.exp
    }
}
