//! Scoped bearer tokens.
//!
//! A token is 16 random bytes, base32-encoded without padding into a
//! 26-character plaintext that is shown to the caller once. Only the SHA-256
//! digest of the plaintext is ever stored; verification re-derives the digest
//! from whatever the caller presents and looks that up.

use chrono::{Duration, Utc};
use data_encoding::BASE32_NOPAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::AuthError;
use crate::models::auth::{Scope, Token, TokenHash, UserId};
use crate::validation::ValidationErrors;

/// Random bytes behind every token.
pub const TOKEN_ENTROPY_BYTES: usize = 16;

/// Length of the base32 plaintext for [`TOKEN_ENTROPY_BYTES`] of entropy.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// Generate a token for `user_id` that expires `ttl` from now.
///
/// Fails only when the operating system cannot supply entropy.
pub fn generate_token(user_id: UserId, ttl: Duration, scope: Scope) -> Result<Token, AuthError> {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Entropy(e.to_string()))?;

    let plaintext = BASE32_NOPAD.encode(&bytes);
    let hash = hash_token(&plaintext);

    Ok(Token {
        plaintext,
        hash,
        user_id,
        expiry: Utc::now() + ttl,
        scope,
    })
}

/// SHA-256 hash a token plaintext for storage and lookup.
pub fn hash_token(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Check that `plaintext` could have come from [`generate_token`].
pub fn validate_token_plaintext(v: &mut ValidationErrors, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
    v.check(
        plaintext
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)),
        "token",
        "must only contain base32 characters",
    );
}
