//! Campus crowd - zone occupancy tracking service
//!
//! Tracks how many people currently occupy named campus zones, classifies
//! each zone's crowd level, expires stale presence via TLV auto-exit, and
//! pushes live snapshots to subscribers.
//!
//! Module structure:
//! - `domain/` - Core types (UserId, CrowdLevel, snapshot records)
//! - `io/` - External interfaces (update listener, snapshot persistence)
//! - `services/` - Business logic (engine, registry, expiry, broadcaster)
//! - `infra/` - Infrastructure (config, clock)

use campus_crowd::infra::{Config, SystemClock};
use campus_crowd::io::{start_update_listener, SnapshotStore, UpdateListenerConfig};
use campus_crowd::services::OccupancyEngine;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Campus crowd - zone occupancy tracking service
#[derive(Parser, Debug)]
#[command(name = "campus-crowd", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("campus-crowd starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::resolve_config_path);
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        zones = %config.zones().len(),
        tlv_secs = %config.tlv_secs(),
        sweep_interval_secs = %config.sweep_interval_secs(),
        backup_file = %config.backup_file(),
        listener_port = %config.listener_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Build the engine and restore the last snapshot before accepting traffic
    let engine = Arc::new(OccupancyEngine::new(&config, Arc::new(SystemClock)));
    let store = SnapshotStore::new(config.backup_file());
    if let Some(snapshot) = store.load() {
        engine.restore(&snapshot);
    }

    // Periodic expiry sweep (auto-exit of stale presence)
    let sweep_engine = engine.clone();
    let mut sweep_shutdown = shutdown_rx.clone();
    let sweep_interval = config.sweep_interval_secs();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval));
        loop {
            tokio::select! {
                _ = sweep_shutdown.changed() => {
                    if *sweep_shutdown.borrow() {
                        info!("sweep_task_shutdown");
                        return;
                    }
                }
                _ = interval.tick() => {
                    let auto_exits = sweep_engine.run_expiry_sweep();
                    if !auto_exits.is_empty() {
                        info!(count = %auto_exits.len(), "expiry_sweep_completed");
                    }
                }
            }
        }
    });

    // Periodic backup of the full registry (and TLV timers)
    if config.backup_enabled() {
        let backup_engine = engine.clone();
        let mut backup_shutdown = shutdown_rx.clone();
        let backup_interval = config.backup_interval_secs();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(backup_interval));
            // First tick fires immediately; skip it so we don't rewrite
            // the snapshot we just restored from
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = backup_shutdown.changed() => {
                        if *backup_shutdown.borrow() {
                            info!("backup_task_shutdown");
                            return;
                        }
                    }
                    _ = interval.tick() => {
                        store.save(&backup_engine.export());
                    }
                }
            }
        });
    }

    // Log each published snapshot (a downstream topic bridge would sit here)
    let mut snapshot_rx = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match snapshot_rx.recv().await {
                Ok(payload) => {
                    if let Ok(json) = serde_json::to_string(&payload) {
                        debug!(snapshot = %json, "occupancy_snapshot");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped = %skipped, "snapshot_subscriber_lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the update listener - accepts location updates until shutdown
    if config.listener_enabled() {
        let listener_config = UpdateListenerConfig {
            port: config.listener_port(),
            enabled: true,
        };
        if let Err(e) = start_update_listener(listener_config, engine, shutdown_rx).await {
            tracing::error!(error = %e, "update listener error");
        }
    } else {
        // Headless mode: periodic tasks keep running until shutdown
        let mut shutdown = shutdown_rx;
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    }

    info!("campus-crowd shutdown complete");
    Ok(())
}
