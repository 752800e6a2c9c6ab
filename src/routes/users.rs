/// User Routes
///
/// The caller's own profile plus the admin-gated listing, lookup and delete.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ValidationError};
use crate::middleware::{ActiveIdentity, AdminIdentity};
use crate::models::{Role, SortOrder, User, UserQuery};
use crate::store::Stores;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// Public view of a user; never carries the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub keyword: Option<String>,
    pub role: Option<Role>,
    pub sort: Option<SortOrder>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl TryFrom<ListUsersQuery> for UserQuery {
    type Error = ValidationError;

    fn try_from(query: ListUsersQuery) -> Result<Self, Self::Error> {
        let skip = query.skip.unwrap_or(0);
        if skip < 0 {
            return Err(ValidationError::InvalidFormat(
                "skip must not be negative".to_string(),
            ));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ValidationError::InvalidFormat(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(UserQuery {
            keyword: query.keyword.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            role: query.role,
            sort: query.sort.unwrap_or_default(),
            skip,
            limit,
        })
    }
}

/// GET /users/me
pub async fn get_current_user(identity: ActiveIdentity) -> HttpResponse {
    let ActiveIdentity(identity) = identity;
    tracing::debug!(user_id = %identity.user_id(), "Current user requested");
    HttpResponse::Ok().json(UserResponse::from(&identity.user))
}

/// GET /users
pub async fn list_users(
    admin: AdminIdentity,
    query: web::Query<ListUsersQuery>,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AppError> {
    let query = UserQuery::try_from(query.into_inner())?;
    let users = stores.users.list(&query).await?;

    tracing::debug!(
        admin_id = %admin.0.user_id(),
        returned = users.len(),
        "User listing served"
    );
    Ok(HttpResponse::Ok().json(users.iter().map(UserResponse::from).collect::<Vec<_>>()))
}

/// GET /users/{id}
pub async fn get_user(
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AppError> {
    let user = stores
        .users
        .find_by_id(path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// DELETE /users/{id}
///
/// The user's ledger entries and file records go with it.
pub async fn delete_user(
    admin: AdminIdentity,
    path: web::Path<Uuid>,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    if !stores.users.delete(user_id).await? {
        return Err(AppError::not_found("User not found"));
    }

    tracing::info!(admin_id = %admin.0.user_id(), user_id = %user_id, "User deleted");
    Ok(HttpResponse::NoContent().finish())
}
