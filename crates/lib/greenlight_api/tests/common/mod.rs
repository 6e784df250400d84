//! Shared harness for the router integration tests.
//!
//! Builds the real router over an in-process store and a mailer that records
//! what it was asked to send.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use greenlight_api::config::{ApiConfig, LimiterConfig};
use greenlight_api::services::mailer::{MailError, Mailer, Notification};
use greenlight_api::services::tokens::issue_token;
use greenlight_api::{AppState, router};
use greenlight_core::auth::password::hash_password;
use greenlight_core::models::auth::{NewUser, Scope, User};
use greenlight_core::store::memory::MemoryStore;
use greenlight_core::store::{PermissionStore, Stores, UserStore};
use tower::ServiceExt;

pub const CLIENT_IP: [u8; 4] = [203, 0, 113, 5];

/// Mailer that keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), notification.clone()));
        Ok(())
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
    pub router: Router,
}

/// A response split into the parts the tests look at.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestApp {
    /// App with the rate limiter disabled.
    pub fn new() -> Self {
        Self::with_limiter(LimiterConfig {
            enabled: false,
            ..LimiterConfig::default()
        })
    }

    pub fn with_limiter(limiter: LimiterConfig) -> Self {
        Self::with_config(ApiConfig {
            env: "testing".into(),
            limiter,
            ..ApiConfig::default()
        })
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(Stores::shared(store.clone()), config, mailer.clone());
        let router = router(state.clone());
        Self {
            store,
            mailer,
            state,
            router,
        }
    }

    /// Send a request from [`CLIENT_IP`].
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        self.send_from(IpAddr::from(CLIENT_IP), method, uri, bearer, body)
            .await
    }

    pub async fn send_from(
        &self,
        ip: IpAddr,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let mut request = builder.body(body).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 40_000)));

        self.dispatch(request).await
    }

    /// Send a prepared request as-is.
    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            json,
        }
    }

    /// Insert a user directly into the store.
    pub async fn create_user(&self, email: &str, password: &str, activated: bool) -> User {
        self.store
            .insert(NewUser {
                name: "Test User".into(),
                email: email.into(),
                password_hash: hash_password(password).unwrap(),
                activated,
            })
            .await
            .unwrap()
    }

    pub async fn grant(&self, user: &User, code: &str) {
        self.store
            .grant_to_user(user.id, &[code.to_string()])
            .await
            .unwrap();
    }

    /// A fresh authentication token for `user`.
    pub async fn login(&self, user: &User) -> String {
        issue_token(self.store.as_ref(), user.id, Scope::Authentication)
            .await
            .unwrap()
            .plaintext
    }

    /// Wait for every background task scheduled so far.
    pub async fn drain_background(&self) {
        self.state.background.shutdown().await;
    }
}
