//! mkt-daemon entry point.
//!
//! Thin on purpose: load config, pick the store, build the shared state,
//! wire middleware, serve. Route handlers live in `routes.rs`; shared state
//! types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mkt_config::{ConfigConsumer, DaemonStore, EngineConfig, UnusedKeyPolicy};
use mkt_daemon::{routes, state};
use mkt_engine::{CommissionStore, EnginePolicy, InMemoryStore};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_DAEMON_ADDR: &str = "MKT_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = mkt_config::load_from_env().context("config load failed")?;
    let report = mkt_config::report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }
    let cfg = EngineConfig::from_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, store = cfg.daemon_store.as_str(), "config loaded");

    let store = open_store(&cfg).await?;
    let shared = Arc::new(
        state::AppState::new(store, EnginePolicy::from_config(&cfg))
            .with_config_hash(loaded.config_hash.clone()),
    );

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&cfg)?;
    info!("mkt-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn open_store(cfg: &EngineConfig) -> anyhow::Result<Arc<dyn CommissionStore>> {
    match cfg.daemon_store {
        DaemonStore::Postgres => {
            let url = mkt_config::resolve_database_url(cfg)?;
            let pool = mkt_db::connect(url.expose(), cfg.db_max_connections).await?;
            mkt_db::migrate(&pool).await?;
            info!(env = %url.env_name, "postgres store ready");
            Ok(Arc::new(mkt_db::PgCommissionStore::new(pool)))
        }
        DaemonStore::Memory => {
            warn!("using in-memory store; ledger is lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// `MKT_DAEMON_ADDR` wins over `daemon.bind_addr`.
fn bind_addr(cfg: &EngineConfig) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var(ENV_DAEMON_ADDR).unwrap_or_else(|_| cfg.daemon_bind_addr.clone());
    raw.parse()
        .with_context(|| format!("invalid bind address: {raw}"))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
