//! Token issuance handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use greenlight_core::auth::AuthError;
use greenlight_core::auth::password::check_credentials;
use greenlight_core::models::auth::{Scope, Token, User};
use greenlight_core::validation::{ValidationErrors, validate_email, validate_password_plaintext};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{JsonBody, MessageResponse};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::services::mailer::Notification;
use crate::services::tokens::issue_token;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationTokenResponse {
    pub authentication_token: Token,
}

/// `POST /v1/tokens/authentication`: exchange email and password for a
/// bearer token.
///
/// An unknown email and a wrong password are both `invalid_credentials`.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<AuthenticationTokenResponse>)> {
    let mut v = ValidationErrors::new();
    validate_email(&mut v, &body.email);
    validate_password_plaintext(&mut v, &body.password);
    v.into_result()?;

    let found = state.stores.users.get_by_email(&body.email).await?;
    let user = check_credentials(found, &body.password).inspect_err(|e| {
        if matches!(e, AuthError::CredentialError) {
            debug!("authentication attempt with invalid credentials");
        }
    })?;

    let token = issue_token(state.stores.tokens.as_ref(), user.id, Scope::Authentication).await?;
    info!(user_id = user.id, "issued authentication token");

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenResponse {
            authentication_token: token,
        }),
    ))
}

/// `POST /v1/tokens/activation`: send a fresh activation token to a user
/// that has not activated yet.
pub async fn create_activation_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let user = user_for_email(&state, &body.email).await?;
    if user.activated {
        return Err(AppError::field("email", "user has already been activated"));
    }

    let token = issue_token(state.stores.tokens.as_ref(), user.id, Scope::Activation).await?;
    state.notify(
        "activation_email",
        user.email,
        Notification::ActivationToken {
            token: token.plaintext,
        },
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email will be sent to you containing activation instructions",
        )),
    ))
}

/// `POST /v1/tokens/password-reset`: send a password-reset token to an
/// activated user.
pub async fn create_password_reset_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let user = user_for_email(&state, &body.email).await?;
    if !user.activated {
        return Err(AppError::field("email", "user account must be activated"));
    }

    let token = issue_token(state.stores.tokens.as_ref(), user.id, Scope::PasswordReset).await?;
    state.notify(
        "password_reset_email",
        user.email,
        Notification::PasswordReset {
            token: token.plaintext,
            expiry: token.expiry,
        },
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email will be sent to you containing password reset instructions",
        )),
    ))
}

async fn user_for_email(state: &AppState, email: &str) -> AppResult<User> {
    let mut v = ValidationErrors::new();
    validate_email(&mut v, email);
    v.into_result()?;

    state
        .stores
        .users
        .get_by_email(email)
        .await?
        .ok_or_else(|| AppError::field("email", "no matching email address found"))
}
