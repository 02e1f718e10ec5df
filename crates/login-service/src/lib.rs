//! Login Service Library
//!
//! An OpenID Connect relying party for the Authorization Code flow:
//!
//! - Login redirects carrying fresh `state` and `nonce`
//! - Callback validation and server-side code-for-token exchange
//! - ID token verification against the provider's cached JWKS
//! - Server-side sessions referenced by a signed cookie
//! - Route guards for browser and API callers
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/auth_flow.rs -> {auth, services, stores}
//! ```
//!
//! # Modules
//!
//! - `auth` - JWKS cache and ID token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error taxonomy with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Session guards and HTTP metrics
//! - `models` - Response models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router and application state
//! - `services` - Provider clients and flow orchestration
//! - `stores` - Pending login and session stores
//! - `tasks` - Background maintenance

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod stores;
pub mod tasks;
