/// Input validators for registration and login payloads
///
/// All storage access goes through bound query parameters, so these checks
/// are about shape and size, not escaping.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MAX_NAME_LENGTH: usize = 256;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Canonical form used for storage and every lookup: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates an email address and returns its canonical form.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let email = normalize_email(email);

    if email.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    if email.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }
    if !EMAIL_REGEX.is_match(&email) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }
    if has_suspicious_email_patterns(&email) {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    Ok(email)
}

/// Validates an optional display name. Blank names are treated as absent.
pub fn is_valid_full_name(name: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("full_name".to_string(), MAX_NAME_LENGTH));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("full_name".to_string()));
    }

    Ok(Some(trimmed.to_string()))
}

/// Password policy for new credentials. Length is counted in characters;
/// the hasher copes with any byte length.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length == 0 {
        return Err(ValidationError::EmptyField("password".to_string()));
    }
    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH));
    }

    Ok(())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if let Some((local_part, _)) = email.split_once('@') {
        if local_part.len() > MAX_LOCAL_PART_LENGTH {
            return true;
        }
    }

    email.matches('@').count() != 1 || email.contains('\0')
}
