use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NewUser, Role, StoreError, User, UserStore};

/// Credential store backed by Postgres. Token consumption relies on
/// conditional `UPDATE ... RETURNING`, so two concurrent attempts on the
/// same token resolve to exactly one winner without an explicit lock.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Raw row shape; `role` comes back as text and is parsed into [`Role`].
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    is_verified: bool,
    verification_token: Option<String>,
    reset_password_token: Option<String>,
    reset_password_expires_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::from_str(&row.role).map_err(StoreError::Backend)?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_verified: row.is_verified,
            verification_token: row.verification_token,
            reset_password_token: row.reset_password_token,
            reset_password_expires_at: row.reset_password_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_verified, \
     verification_token, reset_password_token, reset_password_expires_at, \
     created_at, updated_at";

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.into())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, verification_token)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.verification_token)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return StoreError::DuplicateEmail;
                    }
                }
                backend(e)
            })?;
        row.try_into()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)?;
        row.map(User::try_from).transpose()
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                verification_token = NULL,
                updated_at = now()
            WHERE verification_token = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)?;
        row.map(User::try_from).transpose()
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET reset_password_token = $2,
                reset_password_expires_at = $3,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(token)
            .bind(expires_at)
            .fetch_one(&self.db)
            .await
            .map_err(backend)?;
        row.try_into()
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                reset_password_token = NULL,
                reset_password_expires_at = NULL,
                updated_at = now()
            WHERE reset_password_token = $1
              AND reset_password_expires_at > $3
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .bind(new_password_hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)?;
        row.map(User::try_from).transpose()
    }
}
