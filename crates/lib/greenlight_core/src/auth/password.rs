//! Password storage and credential checks.
//!
//! Passwords are kept only as bcrypt hashes. bcrypt reads at most 72 bytes,
//! which is why validation caps passwords at that length before they get here.

use super::AuthError;
use crate::models::auth::User;

/// bcrypt work factor for new hashes.
pub const BCRYPT_COST: u32 = 12;

pub fn hash_password(plaintext: &str) -> Result<String, AuthError> {
    bcrypt::hash(plaintext, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("hashing password: {e}")))
}

/// Whether `plaintext` matches `hash`. A mismatch is `Ok(false)`; only an
/// unparseable hash is an error.
pub fn verify_password(plaintext: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(plaintext, hash)
        .map_err(|e| AuthError::Internal(format!("verifying password: {e}")))
}

/// Check an email/password login against the user found for the email.
///
/// An unknown user and a wrong password both fail with
/// [`AuthError::CredentialError`].
pub fn check_credentials(user: Option<User>, plaintext: &str) -> Result<User, AuthError> {
    let user = user.ok_or(AuthError::CredentialError)?;
    if verify_password(plaintext, &user.password_hash)? {
        Ok(user)
    } else {
        Err(AuthError::CredentialError)
    }
}
