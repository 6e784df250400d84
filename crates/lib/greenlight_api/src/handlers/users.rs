//! User account handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use greenlight_core::auth::password::hash_password;
use greenlight_core::auth::tokens::validate_token_plaintext;
use greenlight_core::models::auth::{NewUser, PERMISSION_MOVIES_READ, Permissions, Scope, User};
use greenlight_core::validation::{ValidationErrors, validate_new_user, validate_password_plaintext};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{JsonBody, MessageResponse};
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::CurrentIdentity;
use crate::services::mailer::Notification;
use crate::services::tokens::{issue_token, redeem_token};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user: User,
    pub permissions: Permissions,
}

/// `POST /v1/users`: register a new, not yet activated user.
///
/// The user is granted `movies:read` and sent an activation token from a
/// background task; the response does not wait for delivery.
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let mut v = ValidationErrors::new();
    validate_new_user(&mut v, &body.name, &body.email, &body.password);
    v.into_result()?;

    let user = state
        .stores
        .users
        .insert(NewUser {
            name: body.name,
            email: body.email,
            password_hash: hash_password(&body.password)?,
            activated: false,
        })
        .await?;

    state
        .stores
        .permissions
        .grant_to_user(user.id, &[PERMISSION_MOVIES_READ.to_string()])
        .await?;

    let token = issue_token(state.stores.tokens.as_ref(), user.id, Scope::Activation).await?;

    state.notify(
        "welcome_email",
        user.email.clone(),
        Notification::Welcome {
            user_id: user.id,
            activation_token: token.plaintext,
        },
    );

    info!(user_id = user.id, "registered user");
    Ok((StatusCode::ACCEPTED, Json(UserResponse { user })))
}

/// `PUT /v1/users/activated`: activate the owner of an activation token.
///
/// Every activation token of the user is deleted afterwards, so the same
/// token cannot be replayed.
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ActivateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let mut user = redeem_token(state.stores.tokens.as_ref(), Scope::Activation, &body.token).await?;

    user.activated = true;
    let user = state.stores.users.update(&user).await?;

    state
        .stores
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    info!(user_id = user.id, "activated user");
    Ok(Json(UserResponse { user }))
}

/// `PUT /v1/users/password`: set a new password using a password-reset token.
pub async fn update_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UpdatePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut v = ValidationErrors::new();
    validate_password_plaintext(&mut v, &body.password);
    validate_token_plaintext(&mut v, &body.token);
    v.into_result()?;

    let mut user =
        redeem_token(state.stores.tokens.as_ref(), Scope::PasswordReset, &body.token).await?;

    user.password_hash = hash_password(&body.password)?;
    let user = state.stores.users.update(&user).await?;

    state
        .stores
        .tokens
        .delete_all_for_user(Scope::PasswordReset, user.id)
        .await?;

    info!(user_id = user.id, "password reset");
    Ok(Json(MessageResponse::new("your password was successfully reset")))
}

/// `GET /v1/users/me`: the caller's account and permission codes.
pub async fn show_current_user(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> AppResult<Json<CurrentUserResponse>> {
    let user = identity.require_user()?.clone();
    let permissions = state.stores.permissions.list_codes_for_user(user.id).await?;
    Ok(Json(CurrentUserResponse { user, permissions }))
}
