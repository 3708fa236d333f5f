//! KYC oracle client. Asks the external identity provider whether an
//! address is verified and caches the latest answer for the engine.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied when the oracle is unreachable or
//!   rate-limits us, for at most [`MAX_ATTEMPTS`] attempts.
//! * Any other non-success status is a hard failure surfaced to the caller.
//!
//! ## Cache
//!
//! Answers expire after a TTL and the cache holds at most a fixed number of
//! addresses; an expired or evicted address reads as unverified until it is
//! refreshed again.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use sale_engine::{ContributorId, KycOracle};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{LaunchpadError, Result};

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct KycResponse {
    pub verified: bool,
}

#[derive(Debug, Clone, Copy)]
struct CachedStatus {
    verified: bool,
    fetched_at: Instant,
}

/// Latest known verification status per address.
///
/// Implements [`KycOracle`] so the engine can consult it synchronously
/// inside its critical section; [`KycRegistry::refresh`] updates it from the
/// remote oracle beforehand.
pub struct KycRegistry {
    client: Client,
    oracle_url: Option<String>,
    ttl: Duration,
    capacity: usize,
    cache: RwLock<HashMap<ContributorId, CachedStatus>>,
}

impl KycRegistry {
    pub fn new(client: Client, oracle_url: Option<String>) -> Self {
        Self {
            client,
            oracle_url,
            ttl: DEFAULT_CACHE_TTL,
            capacity: DEFAULT_CACHE_CAPACITY,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_cache_limits(mut self, ttl: Duration, capacity: usize) -> Self {
        self.ttl = ttl;
        self.capacity = capacity.max(1);
        self
    }

    /// Query the oracle for `contributor` and remember the answer.
    ///
    /// Without a configured oracle every address is treated as unverified.
    pub async fn refresh(&self, contributor: &ContributorId) -> Result<bool> {
        let verified = match &self.oracle_url {
            Some(url) => fetch_status(&self.client, url, contributor).await?,
            None => false,
        };
        self.remember(contributor, verified);
        Ok(verified)
    }

    fn remember(&self, contributor: &ContributorId, verified: bool) {
        let now = Instant::now();
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());

        if cache.len() >= self.capacity && !cache.contains_key(contributor) {
            cache.retain(|_, status| now.duration_since(status.fetched_at) < self.ttl);
            if cache.len() >= self.capacity {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, status)| status.fetched_at)
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }

        cache.insert(
            contributor.clone(),
            CachedStatus {
                verified,
                fetched_at: now,
            },
        );
    }
}

impl KycOracle for KycRegistry {
    fn is_verified(&self, contributor: &ContributorId) -> bool {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(contributor)
            .is_some_and(|status| status.verified && status.fetched_at.elapsed() < self.ttl)
    }
}

/// `GET {oracle_url}/kyc/{address}` → `{"verified": bool}`.
pub async fn fetch_status(
    client: &Client,
    oracle_url: &str,
    contributor: &ContributorId,
) -> Result<bool> {
    let url = format!("{oracle_url}/kyc/{contributor}");
    let mut backoff = INITIAL_BACKOFF_MS;
    let mut attempt = 1;

    loop {
        let retry_reason = match client.get(&url).send().await {
            Err(e) if e.is_connect() || e.is_timeout() => e.to_string(),
            Err(e) => return Err(e.into()),
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                "rate-limited".to_string()
            }
            Ok(resp) if resp.status().is_server_error() => {
                format!("oracle returned {}", resp.status())
            }
            Ok(resp) if !resp.status().is_success() => {
                return Err(LaunchpadError::KycOracle(format!(
                    "oracle returned {} for {contributor}",
                    resp.status()
                )));
            }
            Ok(resp) => {
                let body: KycResponse = resp.json().await?;
                debug!("KYC status for {contributor}: verified={}", body.verified);
                return Ok(body.verified);
            }
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(LaunchpadError::KycOracle(format!(
                "giving up after {attempt} attempts: {retry_reason}"
            )));
        }
        warn!("KYC oracle request failed (will retry in {backoff}ms): {retry_reason}");
        tokio::time::sleep(Duration::from_millis(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_MS);
        attempt += 1;
    }
}

/// In-process oracle for tests: serves `app` on an ephemeral local port and
/// returns its base URL.
#[cfg(test)]
pub(crate) async fn spawn_test_oracle(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Oracle that verifies exactly the addresses in `verified`.
#[cfg(test)]
pub(crate) fn allow_list_oracle(verified: &'static [&'static str]) -> axum::Router {
    use axum::{extract::Path, routing::get, Json};

    axum::Router::new().route(
        "/kyc/:address",
        get(move |Path(address): Path<String>| async move {
            Json(serde_json::json!({ "verified": verified.contains(&address.as_str()) }))
        }),
    )
}
