//! Server-side state for logins in flight and established sessions.
//!
//! Both stores are traits so that a shared backend can replace the
//! per-process in-memory implementations for horizontally scaled deployments.
//!
//! # Components
//!
//! - `pending` - `AuthorizationRequest`s awaiting their callback
//! - `sessions` - authenticated sessions keyed by opaque handle

pub mod pending;
pub mod sessions;

pub use pending::{AuthorizationRequest, InMemoryPendingLoginStore, PendingLoginStore};
pub use sessions::{InMemorySessionStore, Session, SessionHandle, SessionStore};
