//! Command handler modules for mkt-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod commission;
pub mod payout;

use std::sync::Arc;

use anyhow::{Context, Result};
use mkt_config::{ConfigConsumer, EngineConfig, UnusedKeyPolicy};
use mkt_db::{PgCommissionStore, PgPool};
use mkt_engine::{CommissionEngine, EnginePolicy};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Config from `MKT_CONFIG` (empty when unset). Unused keys are warned
/// about, not fatal.
pub fn load_engine_config() -> Result<EngineConfig> {
    let loaded = mkt_config::load_from_env().context("config load failed")?;
    let report =
        mkt_config::report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        tracing::warn!(key = %key, "unused config key");
    }
    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");
    EngineConfig::from_json(&loaded.config_json)
}

pub async fn connect_pool(cfg: &EngineConfig) -> Result<PgPool> {
    let url = mkt_config::resolve_database_url(cfg)?;
    mkt_db::connect(url.expose(), cfg.db_max_connections).await
}

/// Engine over Postgres, with policy taken from config.
pub async fn open_engine() -> Result<CommissionEngine> {
    let cfg = load_engine_config()?;
    let pool = connect_pool(&cfg).await?;
    let store = Arc::new(PgCommissionStore::new(pool));
    Ok(CommissionEngine::new(store, EnginePolicy::from_config(&cfg)))
}

pub fn parse_id(label: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {label} uuid: {raw}"))
}

pub fn opt_str(v: Option<&str>) -> &str {
    v.unwrap_or("null")
}
