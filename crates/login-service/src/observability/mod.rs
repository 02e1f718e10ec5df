//! Observability for the login service.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
