//! JWKS client for fetching and caching the identity provider's signing keys.
//!
//! Keys are cached with a configurable TTL. A lookup for a key ID that is
//! not cached (or an expired cache) triggers a refresh; concurrent refreshes
//! are coalesced so only one request reaches the provider and every waiter
//! observes that request's outcome.
//!
//! # Security
//!
//! - An unknown key ID causes at most one refresh before `KeyNotFound`
//! - Kid-miss refreshes against a still-fresh cache are rate limited
//! - A failed refresh is reused for the same window instead of refetching
//! - Keys without a `kid` are never selectable

use crate::errors::AuthError;
use crate::observability::metrics;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Minimum time between kid-miss refreshes while the cache is still fresh.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// JSON Web Key from the JWKS endpoint.
///
/// Only the members needed to build a verification key for RSA, EC and OKP
/// keys are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for (e.g. "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Cached key set.
struct CachedJwks {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
}

/// Most recent refresh attempt.
struct RefreshState {
    outcome: Result<(), AuthError>,
    attempted_at: Option<Instant>,
}

/// JWKS client for fetching and caching public keys.
pub struct JwksClient {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached JWKS data.
    cache: RwLock<Option<CachedJwks>>,

    /// Serializes refreshes and holds the outcome of the most recent one.
    refresh_lock: Mutex<RefreshState>,

    /// Count of completed refreshes. Callers record it before checking the
    /// cache so they can tell whether a refresh finished while they waited.
    refresh_generation: AtomicU64,

    /// Cache TTL duration.
    cache_ttl: Duration,

    /// Rate limit for refreshes caused by an unknown kid.
    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Create a new JWKS client.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the provider's JWKS endpoint
    /// * `http_client` - Client with the configured upstream timeout
    /// * `cache_ttl` - How long to trust a fetched key set
    pub fn new(jwks_url: String, http_client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(RefreshState {
                outcome: Ok(()),
                attempted_at: None,
            }),
            refresh_generation: AtomicU64::new(0),
            cache_ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    /// Override the minimum interval between kid-miss refreshes.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// URL of the JWKS endpoint.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Get a JWK by key ID.
    ///
    /// Returns the cached key when present, otherwise refreshes the key set
    /// once and looks again.
    ///
    /// # Errors
    ///
    /// - `AuthError::KeyNotFound` if the key ID is unknown after one refresh
    /// - `AuthError::UpstreamUnavailable` if the key set cannot be fetched
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, AuthError> {
        let observed_generation = self.refresh_generation.load(Ordering::Acquire);

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let now = Instant::now();
                if now.duration_since(cached.fetched_at) < self.cache_ttl {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "login.auth.jwks", kid = %kid, "JWKS cache hit");
                        return Ok(key.clone());
                    }

                    if now.duration_since(cached.fetched_at) < self.min_refresh_interval {
                        tracing::warn!(
                            target: "login.auth.jwks",
                            kid = %kid,
                            "Key not found in recently refreshed JWKS cache"
                        );
                        return Err(AuthError::KeyNotFound);
                    }

                    tracing::debug!(target: "login.auth.jwks", kid = %kid, "Key not found in JWKS cache, refreshing");
                }
            }
        }

        self.refresh(observed_generation).await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|cached| cached.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "login.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(AuthError::KeyNotFound)
    }

    /// Refresh the cache unless another caller already did so after
    /// `observed_generation` was read, or a refresh failed within the
    /// minimum refresh interval.
    async fn refresh(&self, observed_generation: u64) -> Result<(), AuthError> {
        let mut last = self.refresh_lock.lock().await;

        if self.refresh_generation.load(Ordering::Acquire) != observed_generation {
            tracing::debug!(target: "login.auth.jwks", "Reusing concurrent JWKS refresh");
            return last.outcome.clone();
        }

        if let (Err(e), Some(attempted_at)) = (&last.outcome, last.attempted_at) {
            if attempted_at.elapsed() < self.min_refresh_interval {
                tracing::debug!(target: "login.auth.jwks", "Reusing recent JWKS refresh failure");
                return Err(e.clone());
            }
        }

        let outcome = self.fetch_and_store().await;
        last.outcome = outcome.clone();
        last.attempted_at = Some(Instant::now());
        self.refresh_generation.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Fetch the key set from the provider and replace the cache.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch_and_store(&self) -> Result<(), AuthError> {
        let start = Instant::now();
        let result = self.fetch().await;
        metrics::record_jwks_refresh(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        let keys = result?;

        tracing::info!(
            target: "login.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    async fn fetch(&self) -> Result<HashMap<String, Jwk>, AuthError> {
        tracing::debug!(target: "login.auth.jwks", url = %self.jwks_url, "Fetching JWKS from provider");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "login.auth.jwks", error = %e, "Failed to fetch JWKS");
                AuthError::UpstreamUnavailable {
                    retryable: e.is_timeout() || e.is_connect(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "login.auth.jwks",
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(AuthError::UpstreamUnavailable {
                retryable: status.is_server_error(),
            });
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "login.auth.jwks", error = %e, "Failed to parse JWKS response");
            AuthError::UpstreamUnavailable {
                retryable: e.is_timeout(),
            }
        })?;

        Ok(index_keys(jwks.keys))
    }
}

/// Index signing keys by `kid`, dropping keys that cannot be selected.
fn index_keys(keys: Vec<Jwk>) -> HashMap<String, Jwk> {
    keys.into_iter()
        .filter(|key| key.key_use.as_deref().map_or(true, |u| u == "sig"))
        .filter_map(|key| match key.kid.clone() {
            Some(kid) if !kid.is_empty() => Some((kid, key)),
            _ => {
                tracing::debug!(target: "login.auth.jwks", kty = %key.kty, "Skipping JWK without kid");
                None
            }
        })
        .collect()
}
