//! Typed view of the merged config.
//!
//! Every key is optional; a missing key takes the default below. A key
//! that is present but malformed is an error, never a silent default.
//!
//! ```yaml
//! policy:
//!   default_commission_rate: 10      # percent
//!   default_platform_fee_rate: 2     # percent
//!   transaction_fee_rate: 1          # percent of payout total
//!   default_minimum_payout: 0
//!   claim_max_attempts: 3
//!   notify_timeout_ms: 5000
//! db:
//!   url_env: MKT_DATABASE_URL
//!   max_connections: 10
//! daemon:
//!   bind_addr: 127.0.0.1:8899
//!   store: postgres                  # or memory
//! ```

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::secrets::DEFAULT_DB_URL_ENV;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8899";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub default_commission_rate: Decimal,
    pub default_platform_fee_rate: Decimal,
    pub transaction_fee_rate: Decimal,
    pub default_minimum_payout: Decimal,
    pub claim_max_attempts: u32,
    pub notify_timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_commission_rate: Decimal::TEN,
            default_platform_fee_rate: Decimal::TWO,
            transaction_fee_rate: Decimal::ONE,
            default_minimum_payout: Decimal::ZERO,
            claim_max_attempts: 3,
            notify_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStore {
    Postgres,
    Memory,
}

impl DaemonStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonStore::Postgres => "postgres",
            DaemonStore::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(DaemonStore::Postgres),
            "memory" => Ok(DaemonStore::Memory),
            other => bail!("invalid daemon.store: {other} (expected postgres|memory)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub policy: PolicyConfig,
    pub db_url_env: String,
    pub db_max_connections: u32,
    pub daemon_bind_addr: String,
    pub daemon_store: DaemonStore,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            db_url_env: DEFAULT_DB_URL_ENV.to_string(),
            db_max_connections: 10,
            daemon_bind_addr: DEFAULT_BIND_ADDR.to_string(),
            daemon_store: DaemonStore::Postgres,
        }
    }
}

impl EngineConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let d = EngineConfig::default();
        let policy = PolicyConfig {
            default_commission_rate: rate_at(v, "/policy/default_commission_rate")?
                .unwrap_or(d.policy.default_commission_rate),
            default_platform_fee_rate: rate_at(v, "/policy/default_platform_fee_rate")?
                .unwrap_or(d.policy.default_platform_fee_rate),
            transaction_fee_rate: rate_at(v, "/policy/transaction_fee_rate")?
                .unwrap_or(d.policy.transaction_fee_rate),
            default_minimum_payout: match decimal_at(v, "/policy/default_minimum_payout")? {
                Some(m) if m < Decimal::ZERO => {
                    bail!("/policy/default_minimum_payout must be >= 0, got {m}")
                }
                Some(m) => m,
                None => d.policy.default_minimum_payout,
            },
            claim_max_attempts: match u64_at(v, "/policy/claim_max_attempts")? {
                Some(0) => bail!("/policy/claim_max_attempts must be >= 1"),
                Some(n) => u32::try_from(n).context("/policy/claim_max_attempts out of range")?,
                None => d.policy.claim_max_attempts,
            },
            notify_timeout_ms: u64_at(v, "/policy/notify_timeout_ms")?
                .unwrap_or(d.policy.notify_timeout_ms),
        };

        Ok(Self {
            policy,
            db_url_env: str_at(v, "/db/url_env")?.unwrap_or(d.db_url_env),
            db_max_connections: match u64_at(v, "/db/max_connections")? {
                Some(n) => u32::try_from(n).context("/db/max_connections out of range")?,
                None => d.db_max_connections,
            },
            daemon_bind_addr: str_at(v, "/daemon/bind_addr")?.unwrap_or(d.daemon_bind_addr),
            daemon_store: match str_at(v, "/daemon/store")? {
                Some(s) => DaemonStore::parse(&s)?,
                None => d.daemon_store,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Pointer readers
// ---------------------------------------------------------------------------

/// Numbers and numeric strings both decode to an exact `Decimal`; YAML
/// `2.5` is read through its shortest decimal rendering, never as f64 math.
fn decimal_at(v: &Value, ptr: &str) -> Result<Option<Decimal>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|e| anyhow!("{ptr}: invalid decimal {n}: {e}")),
        Some(Value::String(s)) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|e| anyhow!("{ptr}: invalid decimal {s:?}: {e}")),
        Some(other) => bail!("{ptr}: expected number, got {other}"),
    }
}

fn rate_at(v: &Value, ptr: &str) -> Result<Option<Decimal>> {
    let r = decimal_at(v, ptr)?;
    if let Some(rate) = r {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
            bail!("{ptr}: rate must be within [0, 100] percent, got {rate}");
        }
        if rate.normalize().scale() > 4 {
            bail!("{ptr}: rate must have at most 4 decimal places, got {rate}");
        }
    }
    Ok(r)
}

fn u64_at(v: &Value, ptr: &str) -> Result<Option<u64>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(x) => x
            .as_u64()
            .map(Some)
            .ok_or_else(|| anyhow!("{ptr}: expected non-negative integer, got {x}")),
    }
}

fn str_at(v: &Value, ptr: &str) -> Result<Option<String>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(x) => bail!("{ptr}: expected non-empty string, got {x}"),
    }
}
