//! Login Service
//!
//! Entry point for the OIDC relying party.

use anyhow::Context;
use login_service::config::Config;
use login_service::observability::metrics::init_metrics_recorder;
use login_service::routes::{self, AppState};
use login_service::tasks::{start_store_sweep, DEFAULT_SWEEP_INTERVAL};
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "login_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Login Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        issuer = %config.provider.issuer,
        bind_address = %config.bind_address,
        use_discovery = config.provider.use_discovery,
        enforce_nonce = config.provider.enforce_nonce,
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        anyhow::anyhow!(e)
    })?;

    let bind_address = config.bind_address.clone();

    let state = AppState::from_config(config).await.map_err(|e| {
        error!("Failed to initialize application state: {}", e);
        e
    })?;

    let cancel_token = CancellationToken::new();
    let sweep_handle = tokio::spawn(start_store_sweep(
        state.pending.clone(),
        state.sessions.clone(),
        DEFAULT_SWEEP_INTERVAL,
        cancel_token.clone(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{bind_address}'"))?;

    info!("Login Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel_token.cancel();
    if let Err(e) = sweep_handle.await {
        error!("Store sweep task failed: {}", e);
    }

    info!("Login Service shutdown complete");

    Ok(())
}

/// Returns when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
