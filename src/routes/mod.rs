mod admin;
mod auth;
mod files;
mod health_check;
mod users;

pub use admin::{stats, update_role, StatsResponse, UpdateRoleRequest};
pub use auth::{
    login, logout, refresh, register, AccessTokenResponse, LoginRequest, RefreshRequest,
    RegisterRequest, TokenPair,
};
pub use files::{list_files, upload_file};
pub use health_check::health_check;
pub use users::{delete_user, get_current_user, get_user, list_users, ListUsersQuery, UserResponse};
