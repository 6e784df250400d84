//! Token issuance and redemption.

use chrono::Utc;
use greenlight_core::auth::tokens::{generate_token, hash_token, validate_token_plaintext};
use greenlight_core::models::auth::{Scope, Token, User, UserId};
use greenlight_core::store::TokenStore;
use greenlight_core::validation::ValidationErrors;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Generate a token of `scope` for `user_id` and store its hash.
///
/// The returned token is the only copy of the plaintext.
pub async fn issue_token(tokens: &dyn TokenStore, user_id: UserId, scope: Scope) -> AppResult<Token> {
    let token = generate_token(user_id, scope.ttl(), scope)?;
    tokens.put(&token).await?;
    debug!(user_id, scope = %scope, expiry = %token.expiry, "issued token");
    Ok(token)
}

/// Owner of a token presented in a request body.
///
/// A malformed token is a validation error on the `token` field. A token that
/// was never issued, has expired, was already used or belongs to another
/// scope is rejected with one and the same message.
pub async fn redeem_token(tokens: &dyn TokenStore, scope: Scope, plaintext: &str) -> AppResult<User> {
    let mut v = ValidationErrors::new();
    validate_token_plaintext(&mut v, plaintext);
    v.into_result()?;

    tokens
        .find_user_by_valid_token(scope, &hash_token(plaintext), Utc::now())
        .await?
        .ok_or_else(|| AppError::field("token", rejection_message(scope)))
}

fn rejection_message(scope: Scope) -> &'static str {
    match scope {
        Scope::Authentication => "invalid or expired authentication token",
        Scope::Activation => "invalid or expired activation token",
        Scope::PasswordReset => "invalid or expired password reset token",
    }
}
