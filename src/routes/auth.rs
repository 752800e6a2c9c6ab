/// Authentication Routes
///
/// Registration, login, token refresh and logout. Tokens are returned in the
/// body and also set as http-only cookies.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, CookieSettings, REFRESH_TOKEN_COOKIE};
use crate::error::AppError;
use crate::middleware::Identity;
use crate::routes::UserResponse;

const TOKEN_TYPE: &str = "bearer";

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh (or logout) request body, used when no cookie is present
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Cookie first, then the JSON body.
fn presented_refresh_token(
    req: &HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> Option<String> {
    req.cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| body.map(|b| b.into_inner().refresh_token))
}

/// POST /auth/register
///
/// # Errors
/// - 400: Validation errors (invalid email/password/name)
/// - 409: Email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let user = auth
        .register(&form.email, &form.password, form.full_name.as_deref())
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}

/// POST /auth/login
///
/// Same 401 for an unknown email and a wrong password.
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let tokens = auth.login(&form.email, &form.password).await?;

    Ok(HttpResponse::Ok()
        .cookie(cookies.access_cookie(&tokens.access.token, auth.codec().access_ttl()))
        .cookie(cookies.refresh_cookie(&tokens.refresh.token, auth.codec().refresh_ttl()))
        .json(TokenPair {
            access_token: tokens.access.token,
            refresh_token: tokens.refresh.token,
            token_type: TOKEN_TYPE.to_string(),
        }))
}

/// POST /auth/refresh
///
/// # Errors
/// - 400: No refresh token presented
/// - 401: Refresh token invalid, expired or revoked
/// - 404: Token owner no longer exists
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh_token(&req, body);
    let access = auth.refresh(presented.as_deref()).await?;

    Ok(HttpResponse::Ok()
        .cookie(cookies.access_cookie(&access.token, auth.codec().access_ttl()))
        .json(AccessTokenResponse {
            access_token: access.token,
            token_type: TOKEN_TYPE.to_string(),
        }))
}

/// POST /auth/logout
///
/// Revokes the presented refresh token, if any, and clears both cookies.
pub async fn logout(
    req: HttpRequest,
    identity: Identity,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh_token(&req, body);
    auth.logout(presented.as_deref(), &identity).await?;

    let mut response = HttpResponse::Ok();
    for cookie in cookies.removal_cookies() {
        response.cookie(cookie);
    }
    Ok(response.json(serde_json::json!({ "detail": "Logged out" })))
}
