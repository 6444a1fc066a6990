//! Configuration for deal-eligibility

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EligibilityError, Result};

/// Upper bound for `renewal_window_days` (100 years)
pub const MAX_RENEWAL_WINDOW_DAYS: i64 = 36_500;

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Database holding the eligible deal list and proposal views
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum pooled database connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Seconds to wait for a free pooled connection
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Public base URL used in sample request commands
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Listing length when the caller gives no `limit`
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Local listing offers deals ending within this many days
    #[serde(default = "default_renewal_window_days")]
    pub renewal_window_days: i64,

    /// Providers with this much unfinished proposal data may not request more
    #[serde(default = "default_max_outstanding_gib")]
    pub max_outstanding_gib: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_url() -> String {
    "dealer.sqlite".to_string()
}

fn default_pool_size() -> u32 {
    8
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_api_base_url() -> String {
    "https://api.evergreen.filecoin.io".to_string()
}

fn default_limit() -> u64 {
    crate::rank::DEFAULT_LIMIT
}

fn default_renewal_window_days() -> i64 {
    21
}

fn default_max_outstanding_gib() -> u64 {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_url: default_database_url(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            api_base_url: default_api_base_url(),
            default_limit: default_limit(),
            renewal_window_days: default_renewal_window_days(),
            max_outstanding_gib: default_max_outstanding_gib(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| EligibilityError::Config(e.to_string()))
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(EligibilityError::Config("pool_size must be at least 1".into()));
        }
        if self.default_limit == 0 {
            return Err(EligibilityError::Config("default_limit must be positive".into()));
        }
        if !(0..=MAX_RENEWAL_WINDOW_DAYS).contains(&self.renewal_window_days) {
            return Err(EligibilityError::Config(format!(
                "renewal_window_days must be between 0 and {}",
                MAX_RENEWAL_WINDOW_DAYS
            )));
        }
        Ok(())
    }

    pub fn max_outstanding_bytes(&self) -> u64 {
        self.max_outstanding_gib.saturating_mul(1 << 30)
    }
}
