//! Store sweep background task.
//!
//! Periodically drops expired pending logins and sessions and publishes the
//! store sizes as gauges. Lookups already treat expired records as absent;
//! the sweep only bounds memory held by abandoned logins and idle sessions.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled.

use crate::observability::metrics;
use crate::stores::{PendingLoginStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Default sweep interval (1 minute).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the store sweep task.
///
/// Returns when `cancel_token` is cancelled.
#[instrument(skip_all, name = "login.task.store_sweep")]
pub async fn start_store_sweep(
    pending: Arc<dyn PendingLoginStore>,
    sessions: Arc<dyn SessionStore>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "login.task.store_sweep",
        interval_seconds = interval.as_secs(),
        "Starting store sweep task"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_sweep(pending.as_ref(), sessions.as_ref()).await;
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "login.task.store_sweep",
                    "Store sweep task received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}

/// Run a single sweep iteration.
pub(crate) async fn run_sweep(pending: &dyn PendingLoginStore, sessions: &dyn SessionStore) {
    match pending.purge_expired().await {
        Ok(0) => {}
        Ok(count) => {
            debug!(target: "login.task.store_sweep", expired = count, "Purged pending logins");
        }
        Err(e) => {
            error!(target: "login.task.store_sweep", error = %e, "Failed to purge pending logins");
        }
    }

    match sessions.purge_expired().await {
        Ok(0) => {}
        Ok(count) => {
            debug!(target: "login.task.store_sweep", expired = count, "Purged sessions");
        }
        Err(e) => {
            error!(target: "login.task.store_sweep", error = %e, "Failed to purge sessions");
        }
    }

    metrics::set_pending_logins(pending.len().await);
    metrics::set_active_sessions(sessions.len().await);
}
