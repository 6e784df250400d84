//! PostgreSQL store.
//!
//! Every round-trip is bounded by [`QUERY_TIMEOUT`]; a slow database surfaces
//! as [`StoreError::Timeout`] instead of a stuck request.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use super::{PermissionStore, StoreError, TokenStore, UserStore};
use crate::models::auth::{NewUser, Permissions, Scope, Token, TokenHash, User, UserId};

/// Upper bound for a single query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// (id, created_at, name, email, password_hash, activated, version)
type UserRow = (i64, DateTime<Utc>, String, String, String, bool, i32);

fn user_from_row(row: UserRow) -> User {
    let (id, created_at, name, email, password_hash, activated, version) = row;
    User {
        id,
        created_at,
        name,
        email,
        password_hash,
        activated,
        version,
    }
}

/// Run `query` under [`QUERY_TIMEOUT`].
async fn bounded<T, F>(query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, query).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => {
            warn!(timeout = ?QUERY_TIMEOUT, "database query timed out");
            Err(StoreError::Timeout(QUERY_TIMEOUT))
        }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let result = bounded(
            sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (name, email, password_hash, activated) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, created_at, name, email, password_hash, activated, version",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .fetch_one(&self.pool),
        )
        .await;

        match result {
            Ok(row) => Ok(user_from_row(row)),
            Err(StoreError::Database(e)) if is_unique_violation(&e) => {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                "SELECT id, created_at, name, email, password_hash, activated, version \
                 FROM users WHERE lower(email) = lower($1)",
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let result = bounded(
            sqlx::query_scalar::<_, i32>(
                "UPDATE users \
                 SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1 \
                 WHERE id = $5 AND version = $6 \
                 RETURNING version",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool),
        )
        .await;

        match result {
            Ok(Some(version)) => Ok(User {
                version,
                ..user.clone()
            }),
            Ok(None) => Err(StoreError::EditConflict),
            Err(StoreError::Database(e)) if is_unique_violation(&e) => {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn put(&self, token: &Token) -> Result<(), StoreError> {
        let result = bounded(
            sqlx::query(
                "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)",
            )
            .bind(&token.hash[..])
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(StoreError::Database(e)) if is_foreign_key_violation(&e) => {
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_user_by_valid_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                "SELECT u.id, u.created_at, u.name, u.email, u.password_hash, u.activated, u.version \
                 FROM users u \
                 INNER JOIN tokens t ON t.user_id = u.id \
                 WHERE t.hash = $1 \
                   AND t.scope = $2 \
                   AND t.expiry > $3",
            )
            .bind(&hash[..])
            .bind(scope.as_str())
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> Result<(), StoreError> {
        bounded(
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn list_codes_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError> {
        let codes = bounded(
            sqlx::query_scalar::<_, String>(
                "SELECT p.code \
                 FROM permissions p \
                 INNER JOIN users_permissions up ON up.permission_id = p.id \
                 WHERE up.user_id = $1 \
                 ORDER BY p.code",
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(Permissions::new(codes))
    }

    async fn grant_to_user(&self, user_id: UserId, codes: &[String]) -> Result<(), StoreError> {
        // The insert below selects zero rows when no code is known, so it
        // cannot be relied on to reject an unknown user.
        let exists = bounded(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool),
        )
        .await?;
        if !exists {
            return Err(StoreError::NotFound);
        }

        let result = bounded(
            sqlx::query(
                "INSERT INTO users_permissions (user_id, permission_id) \
                 SELECT $1, p.id FROM permissions p WHERE p.code = ANY($2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(codes)
            .execute(&self.pool),
        )
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(StoreError::Database(e)) if is_foreign_key_violation(&e) => {
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}
