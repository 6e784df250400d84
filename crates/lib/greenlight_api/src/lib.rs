//! # greenlight_api
//!
//! HTTP API library for Greenlight.
//!
//! Every request passes the same pipeline, outermost first: request metrics,
//! panic recovery, the request deadline, CORS, the per-client rate limiter, and
//! authentication, which attaches an
//! [`Identity`](greenlight_core::models::auth::Identity). Guarded routes then
//! run their authorization gate chain before the handler.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use greenlight_core::models::auth::PERMISSION_PERMISSIONS_WRITE;
use greenlight_core::store::Stores;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::warn;

use crate::background::BackgroundTasks;
use crate::config::ApiConfig;
use crate::handlers::{debug, healthcheck, permissions, tokens, users};
use crate::middleware::auth::authenticate;
use crate::middleware::authorize::GateChain;
use crate::middleware::metrics::{RequestMetrics, record_metrics};
use crate::middleware::rate_limit::{ClientRegistry, rate_limit};
use crate::middleware::recover;
use crate::services::mailer::{Mailer, Notification};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// User, token and permission stores.
    pub stores: Stores,
    /// API configuration.
    pub config: ApiConfig,
    /// Per-client rate limiters.
    pub limiter: Arc<ClientRegistry>,
    /// Fire-and-forget work such as notification delivery.
    pub background: BackgroundTasks,
    /// Notification delivery.
    pub mailer: Arc<dyn Mailer>,
    /// Request counters served on `/debug/vars`.
    pub metrics: Arc<RequestMetrics>,
}

impl AppState {
    pub fn new(stores: Stores, config: ApiConfig, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = Arc::new(ClientRegistry::new(config.limiter.clone()));
        Self {
            stores,
            config,
            limiter,
            background: BackgroundTasks::new(),
            mailer,
            metrics: Arc::new(RequestMetrics::new()),
        }
    }

    /// Deliver `notification` to `recipient` from a background task.
    pub fn notify(&self, task: &'static str, recipient: String, notification: Notification) {
        let mailer = self.mailer.clone();
        self.background.spawn(task, async move {
            mailer.send(&recipient, &notification).await
        });
    }
}

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Builds the Axum router with all routes, the request pipeline and shared
/// state.
///
/// The server must be run with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the rate limiter
/// can see peer addresses.
pub fn router(state: AppState) -> Router {
    // Public routes; the caller may still be anonymous.
    let public = Router::new()
        .route("/v1/healthcheck", get(healthcheck::healthcheck))
        .route("/debug/vars", get(debug::debug_vars))
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route("/v1/users/password", put(users::update_password))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        )
        .route("/v1/tokens/activation", post(tokens::create_activation_token))
        .route(
            "/v1/tokens/password-reset",
            post(tokens::create_password_reset_token),
        );

    let activated = GateChain::activated().guard(
        Router::new().route("/v1/users/me", get(users::show_current_user)),
    );

    let admin = GateChain::permission(
        PERMISSION_PERMISSIONS_WRITE,
        state.stores.permissions.clone(),
    )
    .guard(Router::new().route(
        "/v1/users/{id}/permissions",
        post(permissions::grant_permissions),
    ));

    Router::new()
        .merge(public)
        .merge(activated)
        .merge(admin)
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit))
        .layer(cors(&state.config.cors_trusted_origins))
        .layer(deadline(state.config.request_timeout))
        .layer(recover::layer())
        .layer(from_fn_with_state(state.metrics.clone(), record_metrics))
        .with_state(state)
}

/// Requests still running after `timeout` are answered with 408.
fn deadline(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// CORS for the trusted origins only, credentials included. An empty list
/// allows no origin.
fn cors(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable trusted origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
