//! Greenlight API server binary.
//!
//! Serves the JSON API on `--port`. With a database URL it runs against
//! PostgreSQL (migrations are applied at startup); without one it runs on the
//! in-process store. On Ctrl-C or SIGTERM it stops accepting connections,
//! then waits for outstanding background tasks before exiting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use greenlight_api::AppState;
use greenlight_api::config::{ApiConfig, LimiterConfig, parse_origins};
use greenlight_api::services::mailer::LogMailer;
use greenlight_core::store::Stores;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,greenlight_api=debug,greenlight_core=debug";

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "greenlight_api_server", about = "Greenlight API server")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 4000)]
    port: u16,

    /// Environment name reported by the healthcheck (development|staging|production).
    #[arg(long, env = "GREENLIGHT_ENV", default_value = "development")]
    env: String,

    /// PostgreSQL connection URL. Runs on the in-process store when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 25)]
    db_max_connections: u32,

    /// Connections the pool keeps open even when idle.
    #[arg(long, env = "DB_MIN_CONNECTIONS", default_value_t = 0)]
    db_min_connections: u32,

    /// Seconds an idle connection is kept before it is closed.
    #[arg(long, env = "DB_CONN_MAX_IDLE_SECS", default_value_t = 15 * 60)]
    db_conn_max_idle_secs: u64,

    /// Seconds a single request may take before it is answered with 408.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    request_timeout_secs: u64,

    /// Rate limiter refill rate, in requests per second.
    #[arg(long, env = "LIMITER_RPS", default_value_t = 2.0)]
    limiter_rps: f64,

    /// Rate limiter burst size.
    #[arg(long, env = "LIMITER_BURST", default_value_t = 4)]
    limiter_burst: u32,

    /// Enable the per-client rate limiter.
    #[arg(long, env = "LIMITER_ENABLED", default_value_t = true, action = ArgAction::Set)]
    limiter_enabled: bool,

    /// Trusted CORS origins, space separated.
    #[arg(long, env = "CORS_TRUSTED_ORIGINS", default_value = "")]
    cors_trusted_origins: String,

    /// Sender address on outgoing notifications.
    #[arg(
        long,
        env = "MAIL_SENDER",
        default_value = "Greenlight <no-reply@greenlight.local>"
    )]
    mail_sender: String,
}

impl Args {
    fn config(&self) -> ApiConfig {
        ApiConfig {
            bind_addr: format!("0.0.0.0:{}", self.port),
            database_url: self.database_url.clone().filter(|url| !url.is_empty()),
            env: self.env.clone(),
            limiter: LimiterConfig {
                enabled: self.limiter_enabled,
                rps: self.limiter_rps,
                burst: self.limiter_burst,
                ..LimiterConfig::default()
            },
            cors_trusted_origins: parse_origins(&self.cors_trusted_origins),
            mail_sender: self.mail_sender.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .min_connections(self.db_min_connections.min(self.db_max_connections))
            .idle_timeout(Duration::from_secs(self.db_conn_max_idle_secs))
            .acquire_timeout(Duration::from_secs(30))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let config = args.config();

    info!(
        env = %config.env,
        port = args.port,
        limiter_enabled = config.limiter.enabled,
        limiter_rps = config.limiter.rps,
        limiter_burst = config.limiter.burst,
        "starting greenlight_api_server"
    );

    let stores = match &config.database_url {
        Some(url) => {
            info!(
                max_connections = args.db_max_connections,
                min_connections = args.db_min_connections,
                max_idle_secs = args.db_conn_max_idle_secs,
                "configuring connection pool"
            );
            let pool = args.pool_options().connect(url).await?;

            info!("running database migrations");
            greenlight_core::migrate::migrate(&pool).await?;
            Stores::postgres(pool)
        }
        None => {
            warn!("no database URL configured, using the in-process store");
            Stores::memory()
        }
    };

    let mailer = Arc::new(LogMailer::new(config.mail_sender.clone()));
    let state = AppState::new(stores, config.clone(), mailer);
    let background = state.background.clone();
    let sweep = state.limiter.spawn_sweep_task();

    let app = greenlight_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    info!("completing background tasks");
    background.shutdown().await;
    sweep.abort();

    served?;
    info!("stopped server");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(signal = "SIGINT", "shutting down server"),
        () = terminate => info!(signal = "SIGTERM", "shutting down server"),
    }
}
