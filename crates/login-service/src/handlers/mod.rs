//! HTTP request handlers for the login service.

pub mod api;
pub mod health;
pub mod login;
pub mod me;
pub mod metrics;

pub use api::call_api;
pub use health::health_check;
pub use login::{callback, login, logout};
pub use me::{dashboard, get_me};
pub use metrics::metrics_handler;
