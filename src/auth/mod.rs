/// Authentication module
///
/// Handles JWT token generation/validation, password hashing,
/// refresh token bookkeeping and the register/login/refresh/logout flow.

mod claims;
mod clock;
mod cookies;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::{AccessClaims, RefreshClaims, TokenClaims, TokenKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cookies::{CookieSettings, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use jwt::{IssuedToken, TokenCodec, Verification};
pub use password::{CredentialHasher, PasswordHasher};
pub use refresh_token::{hash_token, is_usable, LedgerEntry, RefreshLedger};
pub use service::{AuthService, SessionTokens};
