/// Request identity
///
/// What the JWT middleware leaves in request extensions, plus the
/// extractors handlers use to demand an identity, an active account or the
/// admin role.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, FromRequest, HttpMessage, HttpRequest};
use uuid::Uuid;

use crate::auth::{AccessClaims, TokenCodec, Verification, ACCESS_TOKEN_COOKIE};
use crate::error::{AppError, AuthError};
use crate::models::{Role, User};
use crate::store::UserStore;

/// The authenticated caller.
///
/// `role()` is the role embedded in the access token at issue time, which
/// may lag behind `user.role` until the next refresh.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
    pub claims: AccessClaims,
}

impl Identity {
    pub fn new(user: User, claims: AccessClaims) -> Self {
        Self { user, claims }
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }
}

/// Bearer header first, then the access-token cookie.
pub fn access_token_from(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| {
            let (scheme, token) = h.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
        })
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        req.cookie(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Resolve a presented access token to an [`Identity`].
///
/// # Errors
/// - `MissingToken` when nothing was presented
/// - `TokenExpired` / `TokenInvalid` from verification; both answer 401
/// - NotFound if the token names a user that no longer exists
pub async fn authenticate(
    codec: &TokenCodec,
    users: &dyn UserStore,
    token: Option<&str>,
) -> Result<Identity, AppError> {
    let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;

    let claims = match codec.verify_access(token) {
        Verification::Valid(claims) => claims,
        Verification::Expired => {
            tracing::warn!("Access token expired");
            return Err(AuthError::TokenExpired.into());
        }
        Verification::Invalid => {
            tracing::warn!("Access token failed validation");
            return Err(AuthError::TokenInvalid.into());
        }
    };

    let user = users.find_by_id(claims.user_id).await?.ok_or_else(|| {
        tracing::warn!(user_id = %claims.user_id, "Token refers to unknown user");
        AppError::not_found("User not found")
    })?;

    tracing::debug!(user_id = %user.id, role = %claims.role, "JWT validated successfully");
    Ok(Identity::new(user, claims))
}

pub fn require_active(identity: Identity) -> Result<Identity, AppError> {
    if identity.user.is_active {
        Ok(identity)
    } else {
        tracing::warn!(user_id = %identity.user_id(), "Inactive account rejected");
        Err(AuthError::AccountInactive.into())
    }
}

/// Compares against the token's role claim, not the stored role.
pub fn require_role(identity: Identity, role: Role) -> Result<Identity, AppError> {
    if identity.role() == role {
        Ok(identity)
    } else {
        tracing::warn!(
            user_id = %identity.user_id(),
            required = %role,
            presented = %identity.role(),
            "Insufficient role"
        );
        Err(AuthError::InsufficientRole.into())
    }
}

fn identity_of(req: &HttpRequest) -> Result<Identity, AppError> {
    req.extensions()
        .get::<Identity>()
        .cloned()
        .ok_or(AppError::Auth(AuthError::MissingToken))
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(identity_of(req))
    }
}

/// An identity whose account is active.
#[derive(Debug, Clone)]
pub struct ActiveIdentity(pub Identity);

impl FromRequest for ActiveIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(identity_of(req).and_then(require_active).map(ActiveIdentity))
    }
}

/// An active identity holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminIdentity(pub Identity);

impl FromRequest for AdminIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            identity_of(req)
                .and_then(require_active)
                .and_then(|identity| require_role(identity, Role::Admin))
                .map(AdminIdentity),
        )
    }
}
