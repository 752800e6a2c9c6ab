/// Authentication flow
///
/// Register, login, refresh and logout on top of the hasher, the codec and
/// the ledger. Per refresh token the lifecycle is
/// `issued -> active -> revoked | expired`, and both ends are terminal.
/// Refresh tokens are not rotated: a refresh mints a new access token only.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::auth::claims::{AccessClaims, RefreshClaims, TokenClaims};
use crate::auth::clock::Clock;
use crate::auth::jwt::{IssuedToken, TokenCodec};
use crate::auth::password::CredentialHasher;
use crate::auth::refresh_token::{is_usable, RefreshLedger};
use crate::error::{AppError, AuthError, ErrorContext, ValidationError};
use crate::middleware::Identity;
use crate::models::{NewUser, Role, User};
use crate::store::{Stores, UserStore};
use crate::validators::{is_valid_email, is_valid_full_name, is_valid_password, normalize_email};

/// Access and refresh token issued together at login.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access: IssuedToken<AccessClaims>,
    pub refresh: IssuedToken<RefreshClaims>,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn RefreshLedger>,
    codec: TokenCodec,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    /// Verified against when the email is unknown, so both login failures
    /// spend the same bcrypt work
    dummy_hash: Arc<OnceCell<String>>,
}

const DUMMY_PASSWORD: &str = "tokensafe-unknown-account";

impl AuthService {
    pub fn new(
        stores: &Stores,
        codec: TokenCodec,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users: stores.users.clone(),
            ledger: stores.ledger.clone(),
            codec,
            hasher,
            clock,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Compute the unknown-account hash ahead of the first login.
    pub async fn warm_up(&self) -> Result<(), AppError> {
        self.dummy_hash().await.map(|_| ())
    }

    async fn dummy_hash(&self) -> Result<&str, AppError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash_password(DUMMY_PASSWORD))
            .await
            .map(String::as_str)
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    /// Create a user with role `user`.
    ///
    /// # Errors
    /// - Validation error for a malformed email, password or name
    /// - Conflict if the (case-insensitive) email is already registered
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<User, AppError> {
        let email = is_valid_email(email)?;
        is_valid_password(password)?;
        let full_name = is_valid_full_name(full_name)?;

        tracing::info!(email = %email, "Registration attempt received");

        if self.users.find_by_email(&email).await?.is_some() {
            tracing::warn!(email = %email, "Registration failed - email already exists");
            return Err(AppError::conflict("Email already registered"));
        }

        let password_hash = self.hash_password(password).await?;
        let user = self
            .users
            .create(NewUser {
                email,
                full_name,
                password_hash,
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered successfully");
        Ok(user)
    }

    /// Verify credentials and issue a token pair. The refresh token is
    /// recorded in the ledger with the same expiry it carries.
    ///
    /// # Errors
    /// - `InvalidCredentials` for an unknown email or a wrong password alike
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens, AppError> {
        let email = normalize_email(email);
        let context = ErrorContext::new("user_login");

        tracing::info!(email = %email, "Login attempt received");

        let result = self.login_inner(&email, password).await;
        if let Err(e) = &result {
            if !e.is_client_error() {
                context.log_unexpected(e);
            }
        }
        result
    }

    async fn login_inner(&self, email: &str, password: &str) -> Result<SessionTokens, AppError> {
        let user = self.users.find_by_email(email).await?;

        let verified = match &user {
            Some(user) => self.verify_password(password, &user.password_hash).await?,
            None => {
                let dummy = self.dummy_hash().await?.to_owned();
                self.verify_password(password, &dummy).await?;
                false
            }
        };
        let user = match user {
            Some(user) if verified => user,
            _ => {
                tracing::warn!(email = %email, "Failed login attempt");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let access = self.codec.issue_access(user.id, user.role)?;
        let refresh = self.codec.issue_refresh(user.id)?;

        self.ledger
            .record(&refresh.token, user.id, refresh.claims.expires_at())
            .await?;
        self.users.touch_last_login(user.id, self.clock.now()).await?;

        tracing::info!(user_id = %user.id, "User login successful");
        Ok(SessionTokens { access, refresh })
    }

    /// Mint a new access token from a refresh token. The role comes from
    /// the stored user, not from any earlier token.
    ///
    /// # Errors
    /// - Validation error if no token was presented
    /// - `TokenExpired` / `TokenInvalid` from signature verification
    /// - `RefreshTokenRevoked` if the ledger says the token is no longer usable
    /// - NotFound if the user has since been deleted
    pub async fn refresh(
        &self,
        presented: Option<&str>,
    ) -> Result<IssuedToken<AccessClaims>, AppError> {
        tracing::info!("Refresh token request received");

        let Some(token) = presented.filter(|t| !t.is_empty()) else {
            tracing::warn!("Refresh token missing");
            return Err(ValidationError::EmptyField("refresh_token".to_string()).into());
        };

        let claims = self.codec.verify_refresh(token).into_result().map_err(|e| {
            tracing::warn!(reason = %e, "Invalid refresh token provided");
            AppError::from(e)
        })?;

        let context = ErrorContext::new("token_refresh").with_user_id(claims.user_id);
        let result = self.refresh_inner(token, &claims).await;
        if let Err(e) = &result {
            if !e.is_client_error() {
                context.log_unexpected(e);
            }
        }
        result
    }

    async fn refresh_inner(
        &self,
        token: &str,
        claims: &RefreshClaims,
    ) -> Result<IssuedToken<AccessClaims>, AppError> {
        let entry = self.ledger.lookup(token).await?;
        let owned = entry.as_ref().filter(|e| e.user_id == claims.user_id);
        if !is_usable(owned, self.clock.now()) {
            tracing::warn!(user_id = %claims.user_id, "Revoked or expired refresh token used");
            return Err(AuthError::RefreshTokenRevoked.into());
        }

        let Some(user) = self.users.find_by_id(claims.user_id).await? else {
            tracing::error!(user_id = %claims.user_id, "Refresh token valid but user not found");
            return Err(AppError::not_found("User not found"));
        };

        let access = self.codec.issue_access(user.id, user.role)?;

        tracing::info!(user_id = %user.id, "Access token refreshed successfully");
        Ok(access)
    }

    /// Revoke the presented refresh token, if any and if it belongs to the
    /// caller. Succeeds whether or not a token was presented or found;
    /// returns whether a live entry was revoked.
    pub async fn logout(
        &self,
        presented: Option<&str>,
        identity: &Identity,
    ) -> Result<bool, AppError> {
        tracing::info!(user_id = %identity.user_id(), "Logout request received");

        let revoked = match presented.filter(|t| !t.is_empty()) {
            Some(token) => self.revoke_owned(token, identity).await?,
            None => false,
        };
        if revoked {
            tracing::info!(user_id = %identity.user_id(), "Refresh token revoked during logout");
        }

        tracing::info!(user_id = %identity.user_id(), "User logged out successfully");
        Ok(revoked)
    }

    // Only the caller's own entries may be revoked
    async fn revoke_owned(&self, token: &str, identity: &Identity) -> Result<bool, AppError> {
        match self.ledger.lookup(token).await? {
            Some(entry) if entry.user_id == identity.user_id() => self.ledger.revoke(token).await,
            Some(entry) => {
                tracing::warn!(
                    user_id = %identity.user_id(),
                    owner_id = %entry.user_id,
                    "Logout presented another user's refresh token"
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    // bcrypt is CPU-bound; keep it off the request worker
    async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let password_hash = password_hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::jwt::Verification;
    use crate::auth::password::PasswordHasher;
    use crate::configuration::JwtSettings;
    use crate::store::MemoryStore;
    use actix_web::{http::StatusCode, ResponseError};
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts verifications so tests can see how much bcrypt work a path does.
    struct CountingHasher {
        inner: PasswordHasher,
        verifies: AtomicUsize,
    }

    impl CountingHasher {
        fn new() -> Self {
            Self {
                inner: PasswordHasher::new(4),
                verifies: AtomicUsize::new(0),
            }
        }

        fn verifies(&self) -> usize {
            self.verifies.load(Ordering::SeqCst)
        }
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, password: &str) -> Result<String, AppError> {
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, password_hash: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, password_hash)
        }
    }

    struct Fixture {
        service: AuthService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(PasswordHasher::new(4)))
    }

    fn fixture_with(hasher: Arc<dyn CredentialHasher>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let jwt = JwtSettings {
            access_secret: "unit-access-secret-unit-access-secret".to_string(),
            refresh_secret: "unit-refresh-secret-unit-refresh-secret".to_string(),
            access_token_ttl: Duration::minutes(10),
            refresh_token_ttl: Duration::days(7),
            issuer: "tokensafe".to_string(),
        };
        let codec = TokenCodec::new(&jwt, clock.clone());
        let service = AuthService::new(
            &Stores::from_memory(store.clone()),
            codec,
            hasher,
            clock.clone(),
        );
        Fixture {
            service,
            store,
            clock,
        }
    }

    async fn identity_for(fx: &Fixture, user: &User) -> Identity {
        let access = fx.service.codec().issue_access(user.id, user.role).unwrap();
        Identity::new(user.clone(), access.claims)
    }

    #[tokio::test]
    async fn test_register_creates_plain_user() {
        let fx = fixture();
        let user = fx
            .service
            .register("A@X.com", "longpassword1", Some("Ann"))
            .await
            .unwrap();

        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert_ne!(user.password_hash, "longpassword1");
    }

    #[tokio::test]
    async fn test_register_duplicate_email_is_conflict_regardless_of_case() {
        let fx = fixture();
        fx.service.register("a@x.com", "longpassword1", None).await.unwrap();

        let err = fx
            .service
            .register("A@X.COM", "longpassword1", None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let fx = fixture();
        let err = fx.service.register("a@x.com", "short", None).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_records_one_live_ledger_entry() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();

        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();

        let entries = fx.store.ledger_entries(user.id).await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_usable(fx.clock.now()));
        assert_eq!(entries[0].expires_at, tokens.refresh.claims.expires_at());

        let stored = fx.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.last_login_at, Some(fx.clock.now()));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let fx = fixture();
        fx.service.register("a@x.com", "longpassword1", None).await.unwrap();

        let wrong_password = fx.service.login("a@x.com", "wrongpassword").await.unwrap_err();
        let unknown_user = fx.service.login("b@x.com", "longpassword1").await.unwrap_err();

        assert!(matches!(wrong_password, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(unknown_user, AppError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_unknown_email_spends_a_bcrypt_verify_too() {
        let hasher = Arc::new(CountingHasher::new());
        let fx = fixture_with(hasher.clone());
        fx.service.register("a@x.com", "longpassword1", None).await.unwrap();

        fx.service.login("a@x.com", "wrongpassword").await.unwrap_err();
        assert_eq!(hasher.verifies(), 1);

        fx.service.login("nobody@x.com", "wrongpassword").await.unwrap_err();
        assert_eq!(hasher.verifies(), 2);

        fx.service.login("nobody@x.com", "longpassword1").await.unwrap_err();
        assert_eq!(hasher.verifies(), 3);
    }

    #[tokio::test]
    async fn test_warm_up_prepares_unknown_account_hash() {
        let fx = fixture();
        fx.service.warm_up().await.unwrap();

        let dummy = fx.service.dummy_hash().await.unwrap();
        assert!(dummy.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_refresh_issues_access_token_with_current_role() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();

        fx.store.update_role(user.id, Role::Admin).await.unwrap();

        // The already-issued access token keeps the old role
        let old = fx.service.codec().verify_access(&tokens.access.token);
        assert!(matches!(old, Verification::Valid(ref c) if c.role == Role::User));

        let access = fx.service.refresh(Some(&tokens.refresh.token)).await.unwrap();
        assert_eq!(access.claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_bad_request() {
        let fx = fixture();
        let err = fx.service.refresh(None).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = fx.service.refresh(Some("")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_with_access_token_is_invalid() {
        let fx = fixture();
        fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();

        let err = fx.service.refresh(Some(&tokens.access.token)).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_refresh_after_expiry_is_expired() {
        let fx = fixture();
        fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();

        fx.clock.advance(Duration::days(8));
        let err = fx.service.refresh(Some(&tokens.refresh.token)).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_signed_but_unrecorded_refresh_token_is_rejected() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();

        let forged_elsewhere = fx.service.codec().issue_refresh(user.id).unwrap();
        let err = fx
            .service
            .refresh(Some(&forged_elsewhere.token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::RefreshTokenRevoked)));
    }

    #[tokio::test]
    async fn test_logout_revokes_and_blocks_refresh() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();
        let identity = identity_for(&fx, &user).await;

        assert!(fx
            .service
            .logout(Some(&tokens.refresh.token), &identity)
            .await
            .unwrap());

        let err = fx.service.refresh(Some(&tokens.refresh.token)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(matches!(err, AppError::Auth(AuthError::RefreshTokenRevoked)));
    }

    #[tokio::test]
    async fn test_logout_without_token_still_succeeds() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let identity = identity_for(&fx, &user).await;

        assert!(!fx.service.logout(None, &identity).await.unwrap());
        assert!(!fx.service.logout(Some("unknown"), &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_leaves_other_users_tokens_alone() {
        let fx = fixture();
        fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let mallory = fx.service.register("m@x.com", "longpassword1", None).await.unwrap();
        let victim_tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();
        let identity = identity_for(&fx, &mallory).await;

        assert!(!fx
            .service
            .logout(Some(&victim_tokens.refresh.token), &identity)
            .await
            .unwrap());

        assert!(fx
            .service
            .refresh(Some(&victim_tokens.refresh.token))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_logout_twice_is_idempotent() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();
        let identity = identity_for(&fx, &user).await;

        fx.service
            .logout(Some(&tokens.refresh.token), &identity)
            .await
            .unwrap();
        assert!(!fx
            .service
            .logout(Some(&tokens.refresh.token), &identity)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_refresh_after_user_deleted_is_rejected() {
        let fx = fixture();
        let user = fx.service.register("a@x.com", "longpassword1", None).await.unwrap();
        let tokens = fx.service.login("a@x.com", "longpassword1").await.unwrap();

        // Deleting the user cascades to the ledger, so the ledger check fails first
        UserStore::delete(fx.store.as_ref(), user.id).await.unwrap();
        let err = fx.service.refresh(Some(&tokens.refresh.token)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
