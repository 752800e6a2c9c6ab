/// Middleware module
///
/// Custom middleware for authentication, and the identity extractors that
/// read what it leaves behind.

mod identity;
mod jwt_middleware;

pub use identity::{
    access_token_from, authenticate, require_active, require_role, ActiveIdentity, AdminIdentity,
    Identity,
};
pub use jwt_middleware::JwtMiddleware;
