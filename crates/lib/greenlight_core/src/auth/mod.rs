//! Authentication primitives.
//!
//! Provides the token codec and password hashing shared by the HTTP layer and
//! the stores.

pub mod password;
pub mod tokens;

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
