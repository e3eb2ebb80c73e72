//! Runtime configuration.
//!
//! Read from the environment, after loading a `.env` file from the current
//! directory or any parent if one exists:
//!
//! - `DATABASE_URL` (required for the Postgres store)
//! - `AGORA_POOL_SIZE` (default 16)
//! - `AGORA_DEFAULT_LIMIT` (default 100), page size when a request has none

use thiserror::Error;
use tokio_postgres::NoTls;

use crate::plan::DEFAULT_LIMIT;

pub const DEFAULT_POOL_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("cannot create connection pool: {0}")]
    Pool(#[from] deadpool_postgres::CreatePoolError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub pool_size: usize,
    pub default_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            pool_size: DEFAULT_POOL_SIZE,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl Config {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            pool_size: parse_number(&lookup, "AGORA_POOL_SIZE")?.unwrap_or(defaults.pool_size),
            default_limit: parse_number(&lookup, "AGORA_DEFAULT_LIMIT")?
                .unwrap_or(defaults.default_limit),
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Build a deadpool-postgres pool for `database_url`.
    pub fn create_pool(&self) -> Result<deadpool_postgres::Pool, ConfigError> {
        let url = self
            .database_url
            .clone()
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let mut cfg = deadpool_postgres::Config::default();
        cfg.url = Some(url);
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.pool_size));
        Ok(cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)?)
    }
}

fn parse_number<T: std::str::FromStr + PartialOrd + Default>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber { name, value }),
    }
}
