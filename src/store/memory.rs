/// In-memory store.
///
/// Implements every storage trait over maps behind one `RwLock`, so each
/// operation is atomic the way a single-row statement is in PostgreSQL.
/// Used by the test-suite and for running the server without a database.
/// Nothing is persisted.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{hash_token, LedgerEntry, RefreshLedger};
use crate::error::AppError;
use crate::models::{FileUpload, NewFileUpload, NewUser, Role, SortOrder, User, UserQuery};
use crate::store::{FileStore, UserStore};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    /// Keyed by token digest
    ledger: HashMap<String, LedgerEntry>,
    files: Vec<FileUpload>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ledger entry owned by a user, oldest first.
    pub async fn ledger_entries(&self, user_id: Uuid) -> Vec<LedgerEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .ledger
            .values()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        entries
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut state = self.state.write().await;

        if state.users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::conflict("users_email_key"));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            full_name: new_user.full_name,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>, AppError> {
        let state = self.state.read().await;
        let keyword = query.keyword.as_ref().map(|k| k.to_lowercase());

        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| {
                keyword
                    .as_ref()
                    .map_or(true, |k| u.email.to_lowercase().contains(k.as_str()))
            })
            .filter(|u| query.role.map_or(true, |role| u.role == role))
            .cloned()
            .collect();

        users.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if query.sort == SortOrder::Desc {
            users.reverse();
        }

        Ok(users
            .into_iter()
            .skip(query.skip.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(self.state.read().await.users.len() as i64)
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>, AppError> {
        let mut state = self.state.write().await;
        Ok(state.users.get_mut(&user_id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.last_login_at = Some(at);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }

        state.ledger.retain(|_, entry| entry.user_id != user_id);
        state.files.retain(|file| file.owner_id != user_id);
        Ok(true)
    }
}

#[async_trait]
impl RefreshLedger for MemoryStore {
    async fn record(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, AppError> {
        let mut state = self.state.write().await;
        let token_hash = hash_token(token);

        if state.ledger.contains_key(&token_hash) {
            return Err(AppError::conflict("refresh_tokens_token_hash_key"));
        }
        if !state.users.contains_key(&user_id) {
            return Err(AppError::Internal(format!(
                "refresh token owner {} does not exist",
                user_id
            )));
        }

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            token_hash: token_hash.clone(),
            user_id,
            created_at: Utc::now(),
            expires_at,
            revoked: false,
        };
        state.ledger.insert(token_hash, entry.clone());

        Ok(entry)
    }

    async fn lookup(&self, token: &str) -> Result<Option<LedgerEntry>, AppError> {
        let state = self.state.read().await;
        Ok(state.ledger.get(&hash_token(token)).cloned())
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.ledger.get_mut(&hash_token(token)) {
            Some(entry) if !entry.revoked => {
                entry.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create(&self, upload: NewFileUpload) -> Result<FileUpload, AppError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&upload.owner_id) {
            return Err(AppError::Internal(format!(
                "file owner {} does not exist",
                upload.owner_id
            )));
        }

        let file = FileUpload {
            id: Uuid::new_v4(),
            filename: upload.filename,
            file_type: upload.file_type,
            owner_id: upload.owner_id,
            uploaded_at: Utc::now(),
        };
        state.files.push(file.clone());

        Ok(file)
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<FileUpload>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .files
            .iter()
            .filter(|file| file.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
