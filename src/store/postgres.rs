/// PostgreSQL store.
///
/// Schema lives in `migrations/`. Ledger and file rows reference `users`
/// with `ON DELETE CASCADE`, so deleting a user is a single statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_token, LedgerEntry, RefreshLedger};
use crate::error::AppError;
use crate::models::{FileUpload, NewFileUpload, NewUser, Role, SortOrder, User, UserQuery};
use crate::store::{FileStore, UserStore};

const USER_COLUMNS: &str = "id, email, full_name, password_hash, role, is_active, is_verified, \
                            created_at, updated_at, last_login_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: Option<String>,
    password_hash: String,
    role: String,
    is_active: bool,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AppError::Internal(format!("Invalid role stored for {}: {}", row.id, e)))?;

        Ok(User {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    token_hash: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        LedgerEntry {
            id: row.id,
            token_hash: row.token_hash,
            user_id: row.user_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    filename: String,
    file_type: String,
    owner_id: Uuid,
    uploaded_at: DateTime<Utc>,
}

impl From<FileRow> for FileUpload {
    fn from(row: FileRow) -> Self {
        FileUpload {
            id: row.id,
            filename: row.filename,
            file_type: row.file_type,
            owner_id: row.owner_id,
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, sql: &str, user_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, role, is_active, is_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, true, false, $6, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        User::try_from(row)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        self.fetch_user(
            &format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS),
            user_id,
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE lower(email) = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>, AppError> {
        let direction = match query.sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        // position() instead of ILIKE so % and _ in the keyword match literally
        let sql = format!(
            r#"
            SELECT {}
            FROM users
            WHERE ($1::TEXT IS NULL OR position(lower($1) IN lower(email)) > 0)
              AND ($2::TEXT IS NULL OR role = $2)
            ORDER BY created_at {dir}, id {dir}
            OFFSET $3 LIMIT $4
            "#,
            USER_COLUMNS,
            dir = direction
        );

        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(query.keyword.as_deref())
            .bind(query.role.map(|role| role.as_str()))
            .bind(query.skip)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn count(&self) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RefreshLedger for PgStore {
    async fn record(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, AppError> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            INSERT INTO refresh_tokens (id, token_hash, user_id, created_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, false)
            RETURNING id, token_hash, user_id, created_at, expires_at, revoked
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(hash_token(token))
        .bind(user_id)
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn lookup(&self, token: &str) -> Result<Option<LedgerEntry>, AppError> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, token_hash, user_id, created_at, expires_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LedgerEntry::from))
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE token_hash = $2 AND revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(hash_token(token))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl FileStore for PgStore {
    async fn create(&self, upload: NewFileUpload) -> Result<FileUpload, AppError> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            INSERT INTO file_uploads (id, filename, file_type, owner_id, uploaded_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, filename, file_type, owner_id, uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&upload.filename)
        .bind(&upload.file_type)
        .bind(upload.owner_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<FileUpload>, AppError> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, filename, file_type, owner_id, uploaded_at
            FROM file_uploads
            WHERE owner_id = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FileUpload::from).collect())
    }
}
