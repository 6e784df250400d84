//! Request metrics.
//!
//! In-process counters covering every request the router answers, including
//! rejections from the limiter, the gates and recovered panics. Served as JSON
//! on `GET /debug/vars`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;

/// Shared request counters.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    received: AtomicU64,
    sent: AtomicU64,
    processing_micros: AtomicU64,
    by_status: Mutex<BTreeMap<u16, u64>>,
}

/// Point-in-time copy of [`RequestMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_request_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    /// Keyed by the decimal status code.
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn request_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn response_sent(&self, status: u16, elapsed_micros: u64) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(elapsed_micros, Ordering::Relaxed);
        *self
            .by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(status)
            .or_default() += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let by_status = self
            .by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();

        MetricsSnapshot {
            total_request_received: self.received.load(Ordering::Relaxed),
            total_responses_sent: self.sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_micros.load(Ordering::Relaxed),
            total_responses_sent_by_status: by_status,
        }
    }
}

/// Count the request, then the response with its status and handling time.
pub async fn record_metrics(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    metrics.request_received();

    let response = next.run(request).await;

    let elapsed = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    metrics.response_sent(response.status().as_u16(), elapsed);
    response
}

#[cfg(test)]
mod tests {
    use axum::{
        Router, body::Body, http::Request, http::StatusCode, middleware::from_fn_with_state,
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn snapshot_serializes_with_published_names() {
        let metrics = RequestMetrics::new();
        metrics.request_received();
        metrics.response_sent(200, 15);

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["total_request_received"], 1);
        assert_eq!(json["total_responses_sent"], 1);
        assert_eq!(json["total_processing_time_μs"], 15);
        assert_eq!(json["total_responses_sent_by_status"]["200"], 1);
    }

    #[tokio::test]
    async fn counts_responses_by_status() {
        async fn teapot() -> StatusCode {
            StatusCode::IM_A_TEAPOT
        }

        let metrics = Arc::new(RequestMetrics::new());
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/teapot", get(teapot))
            .layer(from_fn_with_state(metrics.clone(), record_metrics));

        for uri in ["/ok", "/ok", "/teapot", "/missing"] {
            app.clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_request_received, 4);
        assert_eq!(snapshot.total_responses_sent, 4);
        assert_eq!(
            snapshot.total_responses_sent_by_status,
            BTreeMap::from([
                ("200".to_string(), 2),
                ("404".to_string(), 1),
                ("418".to_string(), 1),
            ])
        );
    }
}
