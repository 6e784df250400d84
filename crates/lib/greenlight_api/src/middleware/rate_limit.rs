//! Per-client rate limiting.
//!
//! One token bucket per client IP address, created on first sight and
//! forgotten once the client has been idle for a while. The whole map sits
//! behind a single mutex so the request path and the periodic sweep never
//! see a half-updated entry; each critical section is O(1) apart from the
//! sweep itself.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::LimiterConfig;
use crate::error::AppError;

/// Token bucket: holds up to `burst` permits, refilled continuously at `rate`
/// per second. Starts full.
#[derive(Debug, Clone)]
struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32, now: Instant) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
    }

    /// Take one permit if available.
    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Registry of per-address limiters.
#[derive(Debug)]
pub struct ClientRegistry {
    config: LimiterConfig,
    clients: Mutex<HashMap<IpAddr, Client>>,
}

impl ClientRegistry {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a request from `ip` and decide whether to admit it.
    pub fn admit(&self, ip: IpAddr) -> bool {
        self.admit_at(ip, Instant::now())
    }

    /// [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut clients = self.lock();
        let client = clients.entry(ip).or_insert_with(|| Client {
            bucket: TokenBucket::new(self.config.rps, self.config.burst, now),
            last_seen: now,
        });
        client.last_seen = now;
        client.bucket.try_acquire(now)
    }

    /// Forget clients idle for longer than the configured timeout.
    /// Returns how many were evicted.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// [`evict_idle`](Self::evict_idle) with an explicit clock reading.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= idle_timeout);
        before - clients.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic idle sweep.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let evicted = registry.evict_idle();
                if evicted > 0 {
                    debug!(evicted, remaining = registry.len(), "swept idle rate-limit clients");
                }
            }
        })
    }
}

/// Axum middleware: admits or rejects the request by its peer IP address.
///
/// Requires the server to be run with `into_make_service_with_connect_info`.
pub async fn rate_limit(
    State(registry): State<Arc<ClientRegistry>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if registry.is_enabled() {
        let ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or_else(|| AppError::Internal("missing peer address on request".into()))?;

        if !registry.admit(ip) {
            info!(ip = %ip, "rate limit exceeded");
            return Err(AppError::RateLimited);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn registry() -> ClientRegistry {
        ClientRegistry::new(LimiterConfig::default())
    }

    #[test]
    fn burst_is_admitted_then_rejected() {
        let registry = registry();
        let now = Instant::now();
        let client = ip("203.0.113.5");

        let admitted: Vec<bool> = (0..5).map(|_| registry.admit_at(client, now)).collect();
        assert_eq!(admitted, [true, true, true, true, false]);
    }

    #[test]
    fn bucket_refills_at_configured_rate() {
        let registry = registry();
        let start = Instant::now();
        let client = ip("203.0.113.5");

        for _ in 0..4 {
            assert!(registry.admit_at(client, start));
        }
        assert!(!registry.admit_at(client, start));

        // 2 permits per second: half a second buys exactly one more request.
        let later = start + Duration::from_millis(500);
        assert!(registry.admit_at(client, later));
        assert!(!registry.admit_at(client, later));

        // Refill never exceeds the burst.
        let much_later = start + Duration::from_secs(60);
        let admitted = (0..10)
            .filter(|_| registry.admit_at(client, much_later))
            .count();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn clients_are_independent() {
        let registry = registry();
        let now = Instant::now();
        for _ in 0..4 {
            assert!(registry.admit_at(ip("203.0.113.5"), now));
        }
        assert!(!registry.admit_at(ip("203.0.113.5"), now));
        assert!(registry.admit_at(ip("198.51.100.7"), now));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn rejected_requests_still_refresh_last_seen() {
        let registry = registry();
        let start = Instant::now();
        let client = ip("203.0.113.5");
        registry.admit_at(client, start);

        registry.admit_at(client, start + Duration::from_secs(120));
        assert_eq!(registry.evict_idle_at(start + Duration::from_secs(240)), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_evicts_only_idle_clients() {
        let registry = registry();
        let start = Instant::now();
        registry.admit_at(ip("203.0.113.5"), start);
        registry.admit_at(ip("198.51.100.7"), start + Duration::from_secs(100));

        let now = start + Duration::from_secs(181);
        assert_eq!(registry.evict_idle_at(now), 1);
        assert_eq!(registry.len(), 1);

        // A second sweep with no intervening traffic evicts nothing more.
        assert_eq!(registry.evict_idle_at(now), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn evicted_client_starts_with_a_full_bucket() {
        let registry = registry();
        let start = Instant::now();
        let client = ip("203.0.113.5");
        for _ in 0..5 {
            registry.admit_at(client, start);
        }

        let later = start + Duration::from_secs(200);
        registry.evict_idle_at(later);
        assert!(registry.is_empty());
        assert!(registry.admit_at(client, later));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_runs_on_its_period() {
        let registry = Arc::new(registry());
        registry.admit(ip("203.0.113.5"));
        let handle = registry.spawn_sweep_task();

        // At the 3 minute tick the client is exactly at the threshold and stays.
        tokio::time::sleep(Duration::from_secs(181)).await;
        assert_eq!(registry.len(), 1);

        // The 4 minute tick sees it idle past the threshold.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.is_empty());

        handle.abort();
    }
}
