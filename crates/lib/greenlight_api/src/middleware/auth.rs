//! Authentication middleware: Bearer token extraction and lookup.
//!
//! Every request leaves this stage with an [`Identity`] in its extensions:
//! the token's owner, or [`Identity::Anonymous`] when no `Authorization`
//! header was sent. A header that is present but malformed, or whose token is
//! unknown, expired or of another scope, ends the request with the same
//! `invalid_token` rejection so callers cannot tell those cases apart.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use greenlight_core::auth::tokens::{hash_token, validate_token_plaintext};
use greenlight_core::models::auth::{Identity, Scope, User};
use greenlight_core::store::TokenStore;
use greenlight_core::validation::ValidationErrors;
use tracing::{debug, error};

use crate::AppState;
use crate::error::AppError;

/// Resolve the caller's identity from the request headers.
///
/// The token format is checked before hashing so obviously malformed input
/// never reaches the store.
pub async fn resolve_identity(
    tokens: &dyn TokenStore,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Result<Identity, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Identity::Anonymous);
    };
    if value.is_empty() {
        return Ok(Identity::Anonymous);
    }

    let value = value.to_str().map_err(|_| AppError::InvalidToken)?;
    let mut parts = value.split(' ');
    let token = match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => token,
        _ => {
            debug!("authorization header is not of the form 'Bearer <token>'");
            return Err(AppError::InvalidToken);
        }
    };

    let mut v = ValidationErrors::new();
    validate_token_plaintext(&mut v, token);
    if !v.is_valid() {
        debug!(errors = %v, "malformed bearer token");
        return Err(AppError::InvalidToken);
    }

    match tokens
        .find_user_by_valid_token(Scope::Authentication, &hash_token(token), now)
        .await?
    {
        Some(user) => Ok(Identity::User(user)),
        None => {
            debug!("bearer token not found, expired or out of scope");
            Err(AppError::InvalidToken)
        }
    }
}

/// Axum middleware: resolves the identity and inserts it into request
/// extensions. Responses always vary on `Authorization`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved =
        resolve_identity(state.stores.tokens.as_ref(), request.headers(), Utc::now()).await;

    let mut response = match resolved {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// The identity attached by [`authenticate`].
///
/// Extracting it on a route that is not behind [`authenticate`] is a wiring
/// bug; the request fails with an internal error.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl CurrentIdentity {
    /// The authenticated user. Only call behind a gate that rejects anonymous
    /// callers.
    pub fn require_user(&self) -> Result<&User, AppError> {
        self.0.user().ok_or_else(|| {
            error!("anonymous identity reached a handler that requires a user");
            AppError::Internal("anonymous identity behind an authenticated route".into())
        })
    }
}

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_extensions(&parts.extensions)
            .map(|identity| CurrentIdentity(identity.clone()))
    }
}

/// Look up the identity inserted by [`authenticate`].
pub(crate) fn identity_from_extensions(
    extensions: &axum::http::Extensions,
) -> Result<&Identity, AppError> {
    extensions.get::<Identity>().ok_or_else(|| {
        error!("request reached an identity consumer without passing authentication");
        AppError::Internal("missing identity in request extensions".into())
    })
}
