//! Authentication domain models.
//!
//! Users, scoped tokens, permission sets and the per-request identity. These
//! are internal domain models; the HTTP layer serializes `User` and `Token`
//! directly, so hashes and concurrency counters are never emitted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Database id of a user row.
pub type UserId = i64;

/// Reserved id of the anonymous identity. Generated ids start at 1.
pub const ANONYMOUS_USER_ID: UserId = 0;

/// SHA-256 digest of a token plaintext. The only form of a token that is stored.
pub type TokenHash = [u8; 32];

/// Domain user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    /// bcrypt hash of the password.
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    /// Optimistic-concurrency counter, bumped by every successful update.
    #[serde(skip)]
    pub version: i32,
}

/// Fields needed to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

/// The closed set of operations a token can authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Authentication,
    Activation,
    PasswordReset,
}

impl Scope {
    /// Stored representation of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Authentication => "authentication",
            Scope::Activation => "activation",
            Scope::PasswordReset => "password-reset",
        }
    }

    /// Lifetime of a freshly issued token of this scope.
    pub fn ttl(&self) -> Duration {
        match self {
            Scope::Authentication => Duration::hours(24),
            Scope::Activation => Duration::days(3),
            Scope::PasswordReset => Duration::minutes(45),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authentication" => Ok(Scope::Authentication),
            "activation" => Ok(Scope::Activation),
            "password-reset" => Ok(Scope::PasswordReset),
            other => Err(format!("unknown token scope '{other}'")),
        }
    }
}

/// A freshly issued token.
///
/// `plaintext` is handed to the caller exactly once; only `hash` is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

/// Read access to the movie catalogue; granted to every new user.
pub const PERMISSION_MOVIES_READ: &str = "movies:read";
/// Write access to the movie catalogue.
pub const PERMISSION_MOVIES_WRITE: &str = "movies:write";
/// May grant permissions to other users.
pub const PERMISSION_PERMISSIONS_WRITE: &str = "permissions:write";

/// Codes seeded into the `permissions` table.
pub const KNOWN_PERMISSIONS: [&str; 3] = [
    PERMISSION_MOVIES_READ,
    PERMISSION_MOVIES_WRITE,
    PERMISSION_PERMISSIONS_WRITE,
];

/// Permission codes granted to a user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: Vec<String>) -> Self {
        Self(codes)
    }

    /// Exact-match membership test.
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Who is making a request.
///
/// Every request carries exactly one identity once it has passed the
/// authentication stage; callers without credentials are `Anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }

    /// Id of the caller; [`ANONYMOUS_USER_ID`] for anonymous callers.
    pub fn user_id(&self) -> UserId {
        self.user().map_or(ANONYMOUS_USER_ID, |u| u.id)
    }
}
