/// Domain records shared by the stores, the auth flow and the handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role carried by a user record and embedded in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// Always stored in canonical (trimmed, lowercased) form
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields supplied when creating a user; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileUpload {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    #[serde(skip_serializing)]
    pub owner_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFileUpload {
    pub filename: String,
    pub file_type: String,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Admin listing parameters: search, filter, sort and paginate.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// Case-insensitive substring of the email
    pub keyword: Option<String>,
    pub role: Option<Role>,
    /// Ordered by creation time
    pub sort: SortOrder,
    pub skip: i64,
    pub limit: i64,
}
