//! # Observer Agent
//!
//! Standalone node health agent: runs the built-in disk, memory, CPU and OS
//! observers on a fixed cadence and reports their health.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration (config/observer-agent.toml if present)
//! cargo run --bin observer-agent
//!
//! # Run against a specific file and environment
//! OBSERVER_CONFIG_PATH=/etc/observer/agent.toml OBSERVER_ENV=production cargo run --bin observer-agent
//!
//! # Reload observer settings without restarting (unix)
//! kill -HUP <pid>
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use observer_core::builtin::builtin_catalog;
use observer_core::collectors::create_collector;
use observer_core::config::{ConfigManager, SettingsSnapshot};
use observer_core::logging;
use observer_core::orchestration::{EngineContext, ObserverManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!("🚀 Starting Observer Agent...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    let config = ConfigManager::load().context("Failed to load observer agent configuration")?;
    info!("   Environment: {}", config.environment());
    info!(
        "   Config file: {}",
        config
            .source_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none (defaults and environment only)".to_string())
    );

    let collector = create_collector();
    info!("   Platform: {:?}", collector.platform());

    let context = EngineContext::builder(config.config().manager.clone())
        .catalog(builtin_catalog(collector))
        .build();

    let manager = Arc::new(
        ObserverManager::new(Arc::clone(&context), &config.config().snapshot())
            .context("Failed to register observers")?,
    );
    let (reloads, reload_task) = manager.spawn_reload_coordinator();

    let status = manager.status();
    info!("🎉 Observer Agent started on node {}", status.node_name);
    for observer in &status.observers {
        info!(
            "   Observer: {} (enabled: {}, timeout: {}s)",
            observer.name,
            observer.enabled,
            observer.execution_timeout.as_secs()
        );
    }
    info!("   Press Ctrl+C to shutdown gracefully");

    let run_task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run().await })
    };
    let reload_listener = tokio::spawn(forward_reload_signals(Arc::clone(&config), reloads));

    let shutdown = Arc::clone(&context.shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        shutdown.request_shutdown("signal received");
    });

    let result = run_task.await.context("Observer manager task failed")?;
    reload_listener.abort();
    if let Err(e) = reload_task.await {
        warn!("Reload coordinator did not stop cleanly: {}", e);
    }

    match result {
        Ok(()) => {
            info!("👋 Observer Agent shutdown complete");
            Ok(())
        }
        Err(fault) => {
            error!("💥 Observer Agent stopped on fatal fault: {}", fault);
            Err(fault.into())
        }
    }
}

/// Re-read the configuration on SIGHUP and hand the snapshot to the reload coordinator
#[cfg(unix)]
async fn forward_reload_signals(config: Arc<ConfigManager>, reloads: mpsc::Sender<SettingsSnapshot>) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to install SIGHUP handler, live reload disabled: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("🔄 SIGHUP received, reloading observer configuration...");
        match config.reload_snapshot() {
            Ok(snapshot) => {
                if reloads.send(snapshot).await.is_err() {
                    break;
                }
            }
            Err(e) => error!("Configuration reload rejected: {}", e),
        }
    }
}

#[cfg(not(unix))]
async fn forward_reload_signals(_config: Arc<ConfigManager>, _reloads: mpsc::Sender<SettingsSnapshot>) {
    std::future::pending::<()>().await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
