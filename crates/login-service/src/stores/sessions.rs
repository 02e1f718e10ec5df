//! Session store.
//!
//! Sessions live server-side; the browser only ever holds the opaque
//! handle inside a signed cookie. Records are inserted and removed whole.

use crate::auth::IdentityClaims;
use crate::errors::AuthError;
use crate::services::{TokenSet, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::random::{generate_token, DEFAULT_TOKEN_BYTES};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Opaque session identifier carried in the session cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Wrap a handle read from a (verified) cookie.
    pub fn from_cookie_value(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandle([REDACTED])")
    }
}

/// An authenticated principal.
#[derive(Debug, Clone)]
pub struct Session {
    pub handle: SessionHandle,

    /// Verified ID token claims.
    pub claims: IdentityClaims,

    /// Raw tokens, when retention is enabled.
    pub tokens: Option<TokenSet>,

    /// UserInfo profile, when fetched at login.
    pub profile: Option<UserProfile>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Storage for authenticated sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session for verified claims.
    ///
    /// The returned session carries its freshly generated handle.
    async fn create(
        &self,
        claims: IdentityClaims,
        tokens: Option<TokenSet>,
        profile: Option<UserProfile>,
    ) -> Result<Arc<Session>, AuthError>;

    /// Look up a live session. Expired sessions are removed and reported absent.
    async fn get(&self, handle: &SessionHandle) -> Result<Option<Arc<Session>>, AuthError>;

    /// Remove a session. Removing an unknown handle is not an error.
    async fn destroy(&self, handle: &SessionHandle) -> Result<(), AuthError>;

    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, AuthError>;

    /// Number of sessions currently held.
    async fn len(&self) -> usize;
}

/// Per-process session store.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionHandle, Arc<Session>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(
        &self,
        claims: IdentityClaims,
        tokens: Option<TokenSet>,
        profile: Option<UserProfile>,
    ) -> Result<Arc<Session>, AuthError> {
        let token = generate_token(DEFAULT_TOKEN_BYTES).map_err(|_| AuthError::Internal)?;
        let handle = SessionHandle(token);
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                tracing::error!(target: "login.stores.sessions", ttl = ?self.ttl, "Session TTL out of range");
                AuthError::Internal
            })?;

        let session = Arc::new(Session {
            handle: handle.clone(),
            claims,
            tokens,
            profile,
            created_at,
            expires_at,
        });

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&handle) {
            tracing::error!(target: "login.stores.sessions", "Duplicate session handle generated");
            return Err(AuthError::Internal);
        }
        sessions.insert(handle, Arc::clone(&session));

        tracing::debug!(target: "login.stores.sessions", "Session created");
        Ok(session)
    }

    async fn get(&self, handle: &SessionHandle) -> Result<Option<Arc<Session>>, AuthError> {
        let session = self.sessions.read().await.get(handle).cloned();

        match session {
            Some(session) if session.is_expired_at(Utc::now()) => {
                self.sessions.write().await.remove(handle);
                tracing::debug!(target: "login.stores.sessions", "Session expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn destroy(&self, handle: &SessionHandle) -> Result<(), AuthError> {
        if self.sessions.write().await.remove(handle).is_some() {
            tracing::debug!(target: "login.stores.sessions", "Session destroyed");
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, AuthError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        Ok(before - sessions.len())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> IdentityClaims {
        serde_json::from_value(serde_json::json!({
            "sub": sub,
            "iss": "https://idp.example/",
            "aud": "abc",
            "exp": 2_000_000_000,
            "iat": 1_700_000_000,
            "name": "Ada"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));

        let session = store.create(claims("auth0|1"), None, None).await.unwrap();
        let fetched = store.get(&session.handle).await.unwrap().unwrap();

        assert_eq!(fetched.claims.sub, "auth0|1");
        assert_eq!(fetched.claims.name.as_deref(), Some("Ada"));
        assert!(fetched.tokens.is_none());
        assert_eq!(
            fetched.expires_at - fetched.created_at,
            chrono::Duration::seconds(3600)
        );
    }

    #[tokio::test]
    async fn test_handles_are_distinct() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));

        let a = store.create(claims("a"), None, None).await.unwrap();
        let b = store.create(claims("b"), None, None).await.unwrap();

        assert_ne!(a.handle, b.handle);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&a.handle).await.unwrap().unwrap().claims.sub, "a");
        assert_eq!(store.get(&b.handle).await.unwrap().unwrap().claims.sub, "b");
    }

    #[tokio::test]
    async fn test_unknown_handle_is_absent() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));

        let forged = SessionHandle::from_cookie_value("forged");
        assert!(store.get(&forged).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_destroy_removes_session() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));
        let session = store.create(claims("a"), None, None).await.unwrap();

        store.destroy(&session.handle).await.unwrap();
        assert!(store.get(&session.handle).await.unwrap().is_none());

        // Second destroy is a no-op
        store.destroy(&session.handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_absent_and_removed() {
        let store = InMemorySessionStore::new(Duration::from_millis(10));
        let session = store.create(claims("a"), None, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.get(&session.handle).await.unwrap().is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemorySessionStore::new(Duration::from_millis(10));
        store.create(claims("a"), None, None).await.unwrap();
        store.create(claims("b"), None, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_fails_without_storing() {
        let store = InMemorySessionStore::new(Duration::from_secs(u64::MAX));

        let err = store.create(claims("a"), None, None).await.unwrap_err();

        assert_eq!(err, AuthError::Internal);
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_handle_debug_is_redacted() {
        let handle = SessionHandle::from_cookie_value("very-secret-handle");
        assert!(!format!("{handle:?}").contains("very-secret-handle"));
        assert_eq!(handle.as_str(), "very-secret-handle");
    }
}
