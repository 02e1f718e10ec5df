//! Background tasks for the login service.
//!
//! # Tasks
//!
//! - `store_sweep` - Drops expired pending logins and sessions

pub mod store_sweep;

pub use store_sweep::{start_store_sweep, DEFAULT_SWEEP_INTERVAL};
