//! Application error types.
//!
//! Every rejection the pipeline or a handler can produce is one `AppError`
//! variant. Responses carry `{"error": <kind>, "message": <detail>}`; lower
//! layer error text is logged, never sent.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use greenlight_core::auth::AuthError;
use greenlight_core::store::StoreError;
use greenlight_core::validation::ValidationErrors;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// A sentence, or a field-to-message map for validation failures.
    pub message: serde_json::Value,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Edit conflict")]
    EditConflict,

    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or missing authentication token")]
    InvalidToken,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Inactive account")]
    InactiveAccount,

    #[error("Not permitted")]
    NotPermitted,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a single-field validation failure.
    pub fn field(field: &str, message: &str) -> Self {
        let mut v = ValidationErrors::new();
        v.add_error(field, message);
        AppError::Validation(v)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidCredentials
            | AppError::InvalidToken
            | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::InactiveAccount | AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind reported in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound => "not_found",
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::EditConflict => "edit_conflict",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidToken => "invalid_token",
            AppError::AuthenticationRequired => "authentication_required",
            AppError::InactiveAccount => "inactive_account",
            AppError::NotPermitted => "not_permitted",
            AppError::RateLimited => "rate_limited",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> serde_json::Value {
        let text = match self {
            AppError::BadRequest(m) => m.as_str(),
            AppError::NotFound => "the requested resource could not be found",
            AppError::MethodNotAllowed => "the method is not supported for this resource",
            AppError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again"
            }
            AppError::Validation(v) => {
                return serde_json::to_value(v.errors()).unwrap_or_default();
            }
            AppError::InvalidCredentials => "invalid authentication credentials",
            AppError::InvalidToken => "invalid or missing authentication token",
            AppError::AuthenticationRequired => {
                "you must be authenticated to access this resource"
            }
            AppError::InactiveAccount => {
                "your user account must be activated to access this resource"
            }
            AppError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
            }
            AppError::RateLimited => "rate limit exceeded",
            AppError::Internal(_) => {
                "the server encountered a problem and could not process your request"
            }
        };
        serde_json::Value::String(text.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            error!(error = %detail, "internal server error");
        }

        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.message(),
        });
        let mut response = (status, body).into_response();

        if matches!(self, AppError::InvalidToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            StoreError::DuplicateEmail => {
                AppError::field("email", "a user with this email address already exists")
            }
            StoreError::Timeout(_) | StoreError::Database(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::InvalidCredentials,
            AuthError::Entropy(_) | AuthError::Internal(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(v: ValidationErrors) -> Self {
        AppError::Validation(v)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
