/// JWT Token Generation and Validation
///
/// Issues and verifies the two token kinds. Each kind has its own HS256
/// secret and lifetime. Verification reports one of three outcomes so the
/// caller can tell an expired token (go refresh) from a bad one (give up).

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims, TokenClaims, TokenKind};
use crate::auth::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::models::Role;

const TOKEN_ID_LENGTH: usize = 32;

/// Outcome of verifying a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification<C> {
    /// Signature, structure and expiry all check out
    Valid(C),
    /// Signed by us and well-formed, but past its `exp`
    Expired,
    /// Bad signature, wrong key, wrong kind or malformed
    Invalid,
}

impl<C> Verification<C> {
    pub fn into_result(self) -> Result<C, AuthError> {
        match self {
            Verification::Valid(claims) => Ok(claims),
            Verification::Expired => Err(AuthError::TokenExpired),
            Verification::Invalid => Err(AuthError::TokenInvalid),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken<C> {
    pub token: String,
    pub claims: C,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_keys: SigningKeys::from_secret(&config.access_secret),
            refresh_keys: SigningKeys::from_secret(&config.refresh_secret),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            issuer: config.issuer.clone(),
            clock,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token bound to the given role.
    pub fn issue_access(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> Result<IssuedToken<AccessClaims>, AppError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iss: self.issuer.clone(),
            typ: TokenKind::Access,
        };

        let token = sign(&claims, &self.access_keys)?;
        Ok(IssuedToken { token, claims })
    }

    /// Issue a refresh token. It carries no role.
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<IssuedToken<RefreshClaims>, AppError> {
        let now = self.clock.now();
        let claims = RefreshClaims {
            user_id,
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            iss: self.issuer.clone(),
            typ: TokenKind::Refresh,
            jti: generate_token_id(),
        };

        let token = sign(&claims, &self.refresh_keys)?;
        Ok(IssuedToken { token, claims })
    }

    pub fn verify_access(&self, token: &str) -> Verification<AccessClaims> {
        self.verify(token, &self.access_keys)
    }

    pub fn verify_refresh(&self, token: &str) -> Verification<RefreshClaims> {
        self.verify(token, &self.refresh_keys)
    }

    fn verify<C: TokenClaims>(&self, token: &str, keys: &SigningKeys) -> Verification<C> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against the injected clock below
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        let claims = match decode::<C>(token, &keys.decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(kind = ?C::KIND, "Token rejected: {}", e);
                return Verification::Invalid;
            }
        };

        if claims.kind() != C::KIND {
            tracing::debug!(expected = ?C::KIND, found = ?claims.kind(), "Token kind mismatch");
            return Verification::Invalid;
        }

        if self.clock.now().timestamp() >= claims.expires_at_unix() {
            return Verification::Expired;
        }

        Verification::Valid(claims)
    }
}

fn sign<C: TokenClaims>(claims: &C, keys: &SigningKeys) -> Result<String, AppError> {
    encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// 32 random alphanumeric characters
fn generate_token_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LENGTH)
        .map(char::from)
        .collect()
}
