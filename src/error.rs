/// Error handling
///
/// One application-wide error type with domain sub-errors, mapped to HTTP
/// responses in a single place. Response bodies carry a stable `code` the
/// client can branch on; internal detail is logged, never returned.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(String),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(String, usize),
    #[error("{0} is too long (maximum {1})")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(String),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Storage errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Duplicate entry: {0}")]
    UniqueConstraintViolation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database connection error: {0}")]
    ConnectionPool(String),
    #[error("Database error: {0}")]
    UnexpectedError(String),
}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Refresh token revoked or expired")]
    RefreshTokenRevoked,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Insufficient role")]
    InsufficientRole,
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::NotFound(what.into()))
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::UniqueConstraintViolation(what.into()))
    }

    /// Whether this is an expected, caller-caused failure as opposed to a
    /// fault inside the service.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    constraint.to_string(),
                ))
            }
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID for correlating with server logs
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, error_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse) {
        let (code, message) = match self {
            AppError::Validation(e) => ("VALIDATION_ERROR", e.to_string()),

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => {
                    ("DUPLICATE_ENTRY", "Resource already exists".to_string())
                }
                DatabaseError::NotFound(what) => ("NOT_FOUND", what.clone()),
                DatabaseError::ConnectionPool(_) => (
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                DatabaseError::UnexpectedError(_) => {
                    ("DATABASE_ERROR", "Database error occurred".to_string())
                }
            },

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => ("INVALID_CREDENTIALS", e.to_string()),
                // Expired and invalid are indistinguishable to the caller
                AuthError::TokenExpired | AuthError::TokenInvalid => {
                    ("TOKEN_INVALID", "Invalid or expired token".to_string())
                }
                AuthError::MissingToken => ("MISSING_TOKEN", e.to_string()),
                AuthError::RefreshTokenRevoked => ("REFRESH_TOKEN_REVOKED", e.to_string()),
                AuthError::AccountInactive => ("ACCOUNT_INACTIVE", e.to_string()),
                AuthError::InsufficientRole => ("FORBIDDEN", "Admin only".to_string()),
            },

            AppError::Internal(_) => ("INTERNAL_ERROR", "Internal server error".to_string()),
        };

        let status = self.status_code();
        let body = ErrorResponse::new(
            error_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, body)
    }

    fn log_error(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(error_id = error_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(DatabaseError::NotFound(_)) => {
                tracing::info!(error_id = error_id, error = %self, "Resource not found");
            }
            AppError::Database(e) => {
                tracing::error!(error_id = error_id, error = %e, "Database error");
            }
            AppError::Auth(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Authentication error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &error_id);

        let mut response = HttpResponse::build(status);
        if status == StatusCode::UNAUTHORIZED {
            response.insert_header(("WWW-Authenticate", "Bearer"));
        }
        response.json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                DatabaseError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Auth(e) => match e {
                AuthError::AccountInactive | AuthError::InsufficientRole => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Operation context attached to log lines emitted while handling a request
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Log an unexpected failure with the full error chain. The error itself
    /// is left untouched for the caller to propagate.
    pub fn log_unexpected(&self, error: &AppError) {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        tracing::error!(
            request_id = %self.request_id,
            operation = %self.operation,
            user_id = ?self.user_id,
            error = %error,
            error_debug = ?error,
            causes = ?chain,
            "Unexpected error during {}",
            self.operation
        );
    }
}
