/// Storage collaborator
///
/// Trait seams over persistence so the auth flow and handlers run the same
/// against PostgreSQL in production and an in-memory store in tests.
/// Atomicity of single-row inserts and updates is the store's job; nothing
/// above this layer takes locks.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::RefreshLedger;
use crate::error::AppError;
use crate::models::{FileUpload, NewFileUpload, NewUser, Role, User, UserQuery};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// # Errors
    /// Conflict if the email is already taken
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// `email` must already be in canonical form
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>, AppError>;

    async fn count(&self) -> Result<i64, AppError>;

    /// Returns the updated user, or `None` if no such user exists
    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>, AppError>;

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Deletes the user together with their ledger entries and file records.
    /// Returns false if no such user exists.
    async fn delete(&self, user_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create(&self, upload: NewFileUpload) -> Result<FileUpload, AppError>;

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<FileUpload>, AppError>;
}

/// The three stores the application is wired with.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub ledger: Arc<dyn RefreshLedger>,
    pub files: Arc<dyn FileStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            users: store.clone(),
            ledger: store.clone(),
            files: store,
        }
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            ledger: store.clone(),
            files: store,
        }
    }
}
