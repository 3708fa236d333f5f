//! Application configuration loaded from environment variables.

use crate::errors::{LaunchpadError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Base URL of the KYC oracle; unset means nobody is verified
    pub kyc_oracle_url: Option<String>,
    /// Per-request timeout for KYC oracle calls, in seconds
    pub kyc_timeout_secs: u64,
    /// How long a KYC answer stays valid, in seconds
    pub kyc_cache_ttl_secs: u64,
    /// Most addresses kept in the KYC cache
    pub kyc_cache_capacity: usize,
    /// Capacity of each sale's writer queue
    pub writer_queue_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite:./launchpad.db"),
            api_port: var("API_PORT", "3001")
                .parse()
                .map_err(|_| LaunchpadError::Config("Invalid API_PORT".to_string()))?,
            kyc_oracle_url: lookup("KYC_ORACLE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            kyc_timeout_secs: var("KYC_TIMEOUT_SECS", "10")
                .parse()
                .map_err(|_| LaunchpadError::Config("Invalid KYC_TIMEOUT_SECS".to_string()))?,
            kyc_cache_ttl_secs: match var("KYC_CACHE_TTL_SECS", "300").parse() {
                Ok(0) | Err(_) => {
                    return Err(LaunchpadError::Config(
                        "Invalid KYC_CACHE_TTL_SECS".to_string(),
                    ))
                }
                Ok(secs) => secs,
            },
            kyc_cache_capacity: match var("KYC_CACHE_CAPACITY", "10000").parse() {
                Ok(0) | Err(_) => {
                    return Err(LaunchpadError::Config(
                        "Invalid KYC_CACHE_CAPACITY".to_string(),
                    ))
                }
                Ok(capacity) => capacity,
            },
            writer_queue_depth: match var("WRITER_QUEUE_DEPTH", "256").parse() {
                Ok(0) | Err(_) => {
                    return Err(LaunchpadError::Config(
                        "Invalid WRITER_QUEUE_DEPTH".to_string(),
                    ))
                }
                Ok(depth) => depth,
            },
        })
    }
}
