//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`db.url_env: MKT_DATABASE_URL`).
//! - Binaries resolve once at startup and pass the value into constructors.
//! - `Debug` output redacts values; errors name the env var, never the value.

use anyhow::{bail, Result};

use crate::EngineConfig;

/// Env var read for the database URL when `db.url_env` is not set.
pub const DEFAULT_DB_URL_ENV: &str = "MKT_DATABASE_URL";

/// A database connection string resolved from the environment.
#[derive(Clone)]
pub struct ResolvedDatabaseUrl {
    /// Name of the env var it came from.
    pub env_name: String,
    url: String,
}

impl ResolvedDatabaseUrl {
    pub fn expose(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for ResolvedDatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDatabaseUrl")
            .field("env_name", &self.env_name)
            .field("url", &"<REDACTED>")
            .finish()
    }
}

/// Resolve the database URL named by `cfg.db_url_env`.
pub fn resolve_database_url(cfg: &EngineConfig) -> Result<ResolvedDatabaseUrl> {
    resolve_with(cfg, |k| std::env::var(k).ok())
}

/// Injectable form of [`resolve_database_url`] for tests.
pub fn resolve_with<F>(cfg: &EngineConfig, lookup: F) -> Result<ResolvedDatabaseUrl>
where
    F: Fn(&str) -> Option<String>,
{
    let name = cfg.db_url_env.as_str();
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(ResolvedDatabaseUrl {
            env_name: name.to_string(),
            url: v.trim().to_string(),
        }),
        _ => bail!("SECRET_MISSING: env var {name} (database url) is not set or empty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_url() {
        let cfg = EngineConfig::default();
        let r = resolve_with(&cfg, |_| Some("postgres://u:hunter2@db/mkt".into())).unwrap();
        let dbg = format!("{r:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("MKT_DATABASE_URL"));
        assert_eq!(r.expose(), "postgres://u:hunter2@db/mkt");
    }

    #[test]
    fn missing_var_names_the_var_only() {
        let mut cfg = EngineConfig::default();
        cfg.db_url_env = "MKT_TEST_DB".into();
        let err = resolve_with(&cfg, |_| None).unwrap_err().to_string();
        assert!(err.contains("MKT_TEST_DB"));
        assert!(err.contains("SECRET_MISSING"));
    }
}
