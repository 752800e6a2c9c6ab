/// Admin Routes
///
/// Everything here requires an active identity whose token carries the
/// admin role. Listing and delete are shared with `/users`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AdminIdentity;
use crate::models::Role;
use crate::routes::UserResponse;
use crate::store::Stores;

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_users: i64,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// GET /admin/stats
pub async fn stats(
    _admin: AdminIdentity,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AppError> {
    let total_users = stores.users.count().await?;
    Ok(HttpResponse::Ok().json(StatsResponse { total_users }))
}

/// PUT /admin/users/{id}/role
///
/// Takes effect on the next refresh; access tokens already issued keep the
/// role they were signed with.
pub async fn update_role(
    admin: AdminIdentity,
    path: web::Path<Uuid>,
    form: web::Json<UpdateRoleRequest>,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let user = stores
        .users
        .update_role(user_id, form.role)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    tracing::info!(
        admin_id = %admin.0.user_id(),
        user_id = %user.id,
        role = %user.role,
        "User role changed"
    );
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}
