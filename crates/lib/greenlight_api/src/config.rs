//! API server configuration.

use std::time::Duration;

/// Per-client rate limiting.
#[derive(Clone, Debug)]
pub struct LimiterConfig {
    /// When false, every request is admitted and the sweep has nothing to do.
    pub enabled: bool,
    /// Tokens added to each client's bucket per second.
    pub rps: f64,
    /// Bucket capacity, i.e. the largest burst admitted at once.
    pub burst: u32,
    /// How often idle clients are swept.
    pub sweep_interval: Duration,
    /// Clients not seen for longer than this are forgotten.
    pub idle_timeout: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(3 * 60),
        }
    }
}

/// Configuration for the API server.
///
/// The server binary fills this from its command line and environment;
/// [`Default`] carries the values used when nothing is set.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:4000").
    pub bind_addr: String,
    /// PostgreSQL connection URL. `None` runs on the in-process store.
    pub database_url: Option<String>,
    /// Deployment environment reported by the healthcheck.
    pub env: String,
    /// Rate limiting settings.
    pub limiter: LimiterConfig,
    /// Origins allowed to make cross-origin requests.
    pub cors_trusted_origins: Vec<String>,
    /// Sender address used on outgoing notifications.
    pub mail_sender: String,
    /// Deadline for handling a single request.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".into(),
            database_url: None,
            env: "development".into(),
            limiter: LimiterConfig::default(),
            cors_trusted_origins: Vec::new(),
            mail_sender: "Greenlight <no-reply@greenlight.local>".into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Split a space separated origin list.
pub fn parse_origins(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
