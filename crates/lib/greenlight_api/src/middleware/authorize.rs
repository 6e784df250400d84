//! Authorization gates.
//!
//! A [`GateChain`] is an ordered list of [`Gate`]s evaluated against the
//! identity attached by the authentication middleware. Evaluation stops at
//! the first rejection. Chains are only built through the constructors below,
//! which always place the authenticated and activated checks ahead of the
//! permission check that needs a real user id.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self as axum_middleware, Next},
    response::Response,
};
use greenlight_core::models::auth::Identity;
use greenlight_core::store::PermissionStore;
use tracing::debug;

use super::auth::identity_from_extensions;
use crate::error::AppError;

/// One authorization check.
#[async_trait]
pub trait Gate: Send + Sync {
    /// `Ok(())` admits the identity; `Err` is the rejection to send.
    async fn evaluate(&self, identity: &Identity) -> Result<(), AppError>;

    /// Gate identifier for logging.
    fn name(&self) -> &str;
}

/// Rejects the anonymous identity.
pub struct RequireAuthenticated;

#[async_trait]
impl Gate for RequireAuthenticated {
    async fn evaluate(&self, identity: &Identity) -> Result<(), AppError> {
        if identity.is_anonymous() {
            return Err(AppError::AuthenticationRequired);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RequireAuthenticated"
    }
}

/// Rejects users whose account is not activated.
pub struct RequireActivated;

#[async_trait]
impl Gate for RequireActivated {
    async fn evaluate(&self, identity: &Identity) -> Result<(), AppError> {
        match identity.user() {
            None => Err(AppError::AuthenticationRequired),
            Some(user) if !user.activated => Err(AppError::InactiveAccount),
            Some(_) => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "RequireActivated"
    }
}

/// Rejects users not granted `code`.
///
/// Permissions are fetched on every evaluation, so revocations and grants
/// take effect on the next request.
pub struct RequirePermission {
    code: String,
    permissions: Arc<dyn PermissionStore>,
}

impl RequirePermission {
    pub fn new(code: impl Into<String>, permissions: Arc<dyn PermissionStore>) -> Self {
        Self {
            code: code.into(),
            permissions,
        }
    }
}

#[async_trait]
impl Gate for RequirePermission {
    async fn evaluate(&self, identity: &Identity) -> Result<(), AppError> {
        let Some(user) = identity.user() else {
            return Err(AppError::AuthenticationRequired);
        };

        let granted = self.permissions.list_codes_for_user(user.id).await?;
        if !granted.include(&self.code) {
            debug!(user_id = user.id, code = %self.code, "permission not granted");
            return Err(AppError::NotPermitted);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RequirePermission"
    }
}

/// Ordered sequence of gates.
#[derive(Clone)]
pub struct GateChain {
    gates: Arc<[Arc<dyn Gate>]>,
}

impl GateChain {
    fn new(gates: Vec<Arc<dyn Gate>>) -> Self {
        Self {
            gates: gates.into(),
        }
    }

    /// authenticated
    pub fn authenticated() -> Self {
        Self::new(vec![Arc::new(RequireAuthenticated)])
    }

    /// authenticated → activated
    pub fn activated() -> Self {
        Self::new(vec![Arc::new(RequireAuthenticated), Arc::new(RequireActivated)])
    }

    /// authenticated → activated → permitted for `code`
    pub fn permission(code: impl Into<String>, permissions: Arc<dyn PermissionStore>) -> Self {
        Self::new(vec![
            Arc::new(RequireAuthenticated),
            Arc::new(RequireActivated),
            Arc::new(RequirePermission::new(code, permissions)),
        ])
    }

    /// Gate names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Run every gate in order, stopping at the first rejection.
    pub async fn evaluate(&self, identity: &Identity) -> Result<(), AppError> {
        for gate in self.gates.iter() {
            if let Err(e) = gate.evaluate(identity).await {
                debug!(
                    gate = gate.name(),
                    user_id = identity.user_id(),
                    kind = e.kind(),
                    "gate rejected request"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Put every route of `router` behind this chain.
    pub fn guard<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(axum_middleware::from_fn_with_state(self, require))
    }
}

/// Axum middleware: evaluates the chain against the request's identity.
pub async fn require(
    State(chain): State<GateChain>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = identity_from_extensions(request.extensions())?;
    chain.evaluate(identity).await?;
    Ok(next.run(request).await)
}
