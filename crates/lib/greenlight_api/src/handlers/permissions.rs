//! Administrative permission grants.

use axum::Json;
use axum::extract::{Path, State};
use greenlight_core::models::auth::{KNOWN_PERMISSIONS, UserId};
use greenlight_core::validation::ValidationErrors;
use serde::Deserialize;
use tracing::info;

use super::{JsonBody, MessageResponse};
use crate::AppState;
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantPermissionsRequest {
    #[serde(default)]
    pub codes: Vec<String>,
}

/// `POST /v1/users/{id}/permissions`: grant permission codes to a user.
///
/// Existing grants are kept; granting a code twice is a no-op.
pub async fn grant_permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<GrantPermissionsRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = parse_user_id(&id)?;

    let mut v = ValidationErrors::new();
    v.check(!body.codes.is_empty(), "codes", "must contain at least 1 entry");
    v.check(
        body.codes.iter().all(|c| KNOWN_PERMISSIONS.contains(&c.as_str())),
        "codes",
        "must only contain known permission codes",
    );
    v.into_result()?;

    state
        .stores
        .permissions
        .grant_to_user(user_id, &body.codes)
        .await?;

    info!(user_id, codes = ?body.codes, "granted permissions");
    Ok(Json(MessageResponse::new("permissions granted")))
}

/// Ids are positive integers; anything else names no user.
fn parse_user_id(raw: &str) -> AppResult<UserId> {
    match raw.parse::<UserId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_must_be_positive_integers() {
        assert_eq!(parse_user_id("42").unwrap(), 42);
        for raw in ["0", "-1", "abc", ""] {
            assert!(matches!(parse_user_id(raw), Err(AppError::NotFound)), "{raw:?}");
        }
    }
}
