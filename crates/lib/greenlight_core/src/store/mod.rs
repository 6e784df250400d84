//! Persistence seams for users, tokens and permissions.
//!
//! The HTTP layer only talks to these traits. [`postgres::PgStore`] is the
//! production implementation; [`memory::MemoryStore`] keeps everything in
//! process and backs local development and the test suites.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::models::auth::{NewUser, Permissions, Scope, Token, TokenHash, User, UserId};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("edit conflict")]
    EditConflict,

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// User records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with [`StoreError::DuplicateEmail`] when the
    /// email (case-insensitively) is taken.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// Case-insensitive lookup by email.
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Persist changes to `user`, guarded by its version.
    ///
    /// Succeeds only if the stored version still equals `user.version`; the
    /// returned user carries the bumped version. A stale or missing row is an
    /// [`StoreError::EditConflict`].
    async fn update(&self, user: &User) -> Result<User, StoreError>;
}

/// Hashed, scoped tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist the hash, owner, expiry and scope of `token`. The plaintext is
    /// never written.
    async fn put(&self, token: &Token) -> Result<(), StoreError>;

    /// Owner of the token with `hash` in `scope`, provided it expires after
    /// `now`. Expired, wrong-scope and unknown tokens all yield `None`.
    async fn find_user_by_valid_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Delete every token of `scope` owned by `user_id`.
    async fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> Result<(), StoreError>;
}

/// Permission grants.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn list_codes_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError>;

    /// Grant `codes` to `user_id`. Unknown codes and existing grants are
    /// ignored; an unknown user is [`StoreError::NotFound`].
    async fn grant_to_user(&self, user_id: UserId, codes: &[String]) -> Result<(), StoreError>;
}

/// The set of stores the application runs against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Stores {
    /// Stores backed by PostgreSQL.
    pub fn postgres(pool: PgPool) -> Self {
        Self::shared(Arc::new(postgres::PgStore::new(pool)))
    }

    /// Stores backed by a fresh in-process [`memory::MemoryStore`].
    pub fn memory() -> Self {
        Self::shared(Arc::new(memory::MemoryStore::new()))
    }

    /// Use one value for all three roles.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + TokenStore + PermissionStore + 'static,
    {
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }
}
