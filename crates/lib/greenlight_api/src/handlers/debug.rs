//! Operational introspection.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::middleware::metrics::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct DebugVars {
    pub version: &'static str,
    /// Clients currently tracked by the rate limiter.
    pub limiter_clients: usize,
    pub background_tasks: usize,
    #[serde(flatten)]
    pub requests: MetricsSnapshot,
}

/// `GET /debug/vars`: request counters and process state as JSON.
pub async fn debug_vars(State(state): State<AppState>) -> Json<DebugVars> {
    Json(DebugVars {
        version: crate::version(),
        limiter_clients: state.limiter.len(),
        background_tasks: state.background.outstanding(),
        requests: state.metrics.snapshot(),
    })
}
