//! In-process store.
//!
//! Mirrors the PostgreSQL semantics (case-insensitive unique emails, versioned
//! updates, expiry-filtered token lookup, seeded permission codes) behind one
//! mutex. Nothing survives a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{PermissionStore, StoreError, TokenStore, UserStore};
use crate::models::auth::{
    KNOWN_PERMISSIONS, NewUser, Permissions, Scope, Token, TokenHash, User, UserId,
};

#[derive(Debug, Clone)]
struct TokenRow {
    user_id: UserId,
    expiry: DateTime<Utc>,
    scope: Scope,
}

#[derive(Debug, Default)]
struct State {
    next_id: UserId,
    users: BTreeMap<UserId, User>,
    tokens: HashMap<TokenHash, TokenRow>,
    known_codes: BTreeSet<String>,
    grants: HashMap<UserId, BTreeSet<String>>,
}

impl State {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        let email = email.to_lowercase();
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.to_lowercase() == email)
    }
}

/// Store that keeps users, tokens and grants in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                known_codes: KNOWN_PERMISSIONS.iter().map(|c| c.to_string()).collect(),
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored tokens, regardless of expiry.
    pub fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.lock();
        if state.email_taken(&user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }

        let id = state.next_id;
        state.next_id += 1;
        let user = User {
            id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version: 1,
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_lowercase();
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut state = self.lock();
        match state.users.get(&user.id) {
            Some(stored) if stored.version == user.version => {}
            _ => return Err(StoreError::EditConflict),
        }
        if state.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }

        let updated = User {
            version: user.version + 1,
            ..user.clone()
        };
        state.users.insert(user.id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn put(&self, token: &Token) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        state.tokens.insert(
            token.hash,
            TokenRow {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
        Ok(())
    }

    async fn find_user_by_valid_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let state = self.lock();
        Ok(state
            .tokens
            .get(hash)
            .filter(|row| row.scope == scope && row.expiry > now)
            .and_then(|row| state.users.get(&row.user_id))
            .cloned())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> Result<(), StoreError> {
        self.lock()
            .tokens
            .retain(|_, row| !(row.scope == scope && row.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn list_codes_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError> {
        Ok(self
            .lock()
            .grants
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant_to_user(&self, user_id: UserId, codes: &[String]) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        let known: Vec<String> = codes
            .iter()
            .filter(|c| state.known_codes.contains(*c))
            .cloned()
            .collect();
        state.grants.entry(user_id).or_default().extend(known);
        Ok(())
    }
}
