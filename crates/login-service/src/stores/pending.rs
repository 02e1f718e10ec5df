//! Pending login store.
//!
//! Holds one `AuthorizationRequest` per in-flight login, keyed by its
//! `state` token. A request is removed at lookup, so it can be consumed at
//! most once.

use crate::errors::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;

/// A login started by `begin_login` and awaiting its callback.
#[derive(Clone)]
pub struct AuthorizationRequest {
    /// CSRF token echoed back by the provider.
    pub state: String,

    /// Value the ID token must carry in its `nonce` claim.
    pub nonce: String,

    /// Local path to send the browser to after login.
    pub return_to: String,

    pub created_at: DateTime<Utc>,
}

impl AuthorizationRequest {
    /// Whether the request is older than `ttl` at `now`.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // A TTL past the representable range never elapses
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .is_some_and(|deadline| deadline <= now)
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("state", &"[REDACTED]")
            .field("nonce", &"[REDACTED]")
            .field("return_to", &self.return_to)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Storage for pending logins.
#[async_trait]
pub trait PendingLoginStore: Send + Sync {
    /// Record a new pending login.
    ///
    /// Fails with `AuthError::Internal` if the state is already pending.
    async fn insert(&self, request: AuthorizationRequest) -> Result<(), AuthError>;

    /// Remove and return the pending login for `state`.
    ///
    /// Returns `None` if no such login exists or it has expired.
    async fn take(&self, state: &str) -> Result<Option<AuthorizationRequest>, AuthError>;

    /// Drop expired pending logins, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, AuthError>;

    /// Number of pending logins currently held.
    async fn len(&self) -> usize;
}

/// Per-process pending login store.
pub struct InMemoryPendingLoginStore {
    entries: RwLock<HashMap<String, AuthorizationRequest>>,
    ttl: Duration,
}

impl InMemoryPendingLoginStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl PendingLoginStore for InMemoryPendingLoginStore {
    async fn insert(&self, request: AuthorizationRequest) -> Result<(), AuthError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&request.state) {
            tracing::error!(target: "login.stores.pending", "Duplicate state token generated");
            return Err(AuthError::Internal);
        }
        entries.insert(request.state.clone(), request);
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<AuthorizationRequest>, AuthError> {
        let request = self.entries.write().await.remove(state);
        Ok(request.filter(|r| {
            let expired = r.is_expired_at(self.ttl, Utc::now());
            if expired {
                tracing::debug!(target: "login.stores.pending", "Pending login expired");
            }
            !expired
        }))
    }

    async fn purge_expired(&self) -> Result<usize, AuthError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, r| !r.is_expired_at(self.ttl, now));
        Ok(before - entries.len())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
