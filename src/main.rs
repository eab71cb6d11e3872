//! LRU Memcache admin server
//!
//! Serves a `String` cache over HTTP and forwards process signals to it as
//! lifecycle events.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lru_memcache::api::{create_router, AppState};
use lru_memcache::config::Config;
use lru_memcache::tasks::{self, TaskGuard};

/// Main entry point for the cache admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and its signal channel
/// 4. Start the auto trim task and signal listener
/// 5. Forward SIGUSR1/SIGUSR2 as memory warning/background
/// 6. Serve the admin router on the configured port
/// 7. Shut down gracefully on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lru_memcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LRU Memcache server");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: name={:?}, count_limit={}, cost_limit={}, port={}",
        config.cache.name, config.cache.count_limit, config.cache.cost_limit, config.server_port
    );
    info!(
        "Age limit {:?}, auto trim every {:?}",
        config.cache.age_limit, config.cache.auto_trim_interval
    );

    let state = AppState::from_config(&config);
    let mut background = tasks::attach(&state.cache, Some(state.subscribe()));
    info!("Auto trim task and signal listener started");

    #[cfg(unix)]
    background.push(forward_process_signals(state.clone())?);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Maps SIGUSR1 to a memory warning and SIGUSR2 to backgrounding.
#[cfg(unix)]
fn forward_process_signals(state: AppState) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    use lru_memcache::LifecycleSignal;
    use signal::unix::{signal, SignalKind};

    let mut usr1 =
        signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let mut usr2 =
        signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(()) = usr1.recv() => LifecycleSignal::MemoryWarning,
                Some(()) = usr2.recv() => LifecycleSignal::Background,
                else => break,
            };
            info!("Process signal mapped to {:?}", event);
            state.deliver(event);
        }
    }))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the
/// background tasks.
async fn shutdown_signal(mut background: TaskGuard) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    background.shutdown();
    info!("Background tasks stopped");
}
