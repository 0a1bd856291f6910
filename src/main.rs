//! Healthcheck coordinator daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ loader ──▶ vserver checks ──▶ ┌──────────────────────┐
//!        ▲                                        │  HealthcheckManager  │──▶ IPVS (fwmark services)
//!        └── watcher (hot reload) ───────────────▶│  dedup / ids / marks │
//!                                                 └──────────┬───────────┘
//!                                                            │ configs()
//!   probe engine ── Notification ──▶ queue_health_state ─────┘
//!                                          │
//!                                          ▼
//!                            per-vserver CheckNotification
//! ```

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use hc_coordinator::config::loader::load_config;
use hc_coordinator::config::watcher::ConfigWatcher;
use hc_coordinator::config::{CoordinatorConfig, EngineConfig, VserverConfig};
use hc_coordinator::engine::{
    Check, CheckKey, CheckNotification, CheckNotifier, FatalError, HealthcheckManager,
};
use hc_coordinator::ipvs::LoggingForwardingTable;
use hc_coordinator::lifecycle::{signals, Shutdown};
use hc_coordinator::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "hc-coordinator")]
#[command(about = "Healthcheck coordinator for the load balancer engine", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "hc-coordinator.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!("hc-coordinator v0.1.0 starting");

    tracing::info!(
        path = ?cli.config,
        vservers = config.vservers.len(),
        mark_base = config.coordinator.mark_base,
        mark_size = config.coordinator.mark_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let table = Arc::new(LoggingForwardingTable::new());
    let (manager, mut task) = HealthcheckManager::spawn(&config.coordinator, table);

    let (note_tx, mut note_rx) = mpsc::unbounded_channel::<CheckNotification>();
    let notifier: Arc<dyn CheckNotifier> = Arc::new(note_tx);

    let shutdown = Shutdown::new();
    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    let mut pushed = HashSet::new();
    if let Err(e) = push_vservers(&manager, &config, &mut pushed, &notifier).await {
        tracing::error!(error = %e, "Failed to push vserver checks");
        manager_exited(task.await);
    }

    let (_watcher, mut config_updates) = if cli.no_watch {
        (None, mpsc::unbounded_channel().1)
    } else {
        let (watcher, updates) = ConfigWatcher::new(&cli.config, config.clone());
        (Some(watcher.run()?), updates)
    };

    let mut last_coordinator = config.coordinator.clone();
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            res = &mut task => manager_exited(res),
            Some(new_config) = config_updates.recv() => {
                if coordinator_changed(&mut last_coordinator, &new_config.coordinator) {
                    tracing::warn!("Coordinator settings changed; restart required to apply them");
                }
                if let Err(e) = push_vservers(&manager, &new_config, &mut pushed, &notifier).await {
                    tracing::error!(error = %e, "Failed to push vserver checks");
                    manager_exited((&mut task).await);
                }
            }
            Some(note) = note_rx.recv() => {
                tracing::info!(
                    check = %note.key.name,
                    backend = %note.key.backend_ip,
                    state = %note.status.state,
                    description = %note.description,
                    "Healthcheck status"
                );
            }
            _ = stop.recv() => break,
        }
    }

    tracing::info!("Shutting down healthcheck manager");
    if manager.shutdown().await.is_err() {
        manager_exited(task.await);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Handles the manager task ending outside a shutdown handshake.
///
/// Marks and IPVS state may no longer match, so the process aborts.
fn manager_exited(res: Result<Result<(), FatalError>, JoinError>) -> ! {
    match res {
        Ok(Ok(())) => tracing::error!("Healthcheck manager stopped unexpectedly"),
        Ok(Err(e)) => tracing::error!(error = %e, "Healthcheck manager failed"),
        Err(e) => tracing::error!(error = %e, "Healthcheck manager panicked"),
    }
    std::process::exit(1);
}

/// Records the `[coordinator]` section of a reload, returning whether it
/// differs from the previous reload.
fn coordinator_changed(last: &mut CoordinatorConfig, new: &CoordinatorConfig) -> bool {
    if last == new {
        return false;
    }
    *last = new.clone();
    true
}

/// Pushes full replacement check sets for every vserver in `config`, and
/// empty sets for vservers pushed earlier that are no longer configured.
async fn push_vservers(
    manager: &HealthcheckManager,
    config: &EngineConfig,
    pushed: &mut HashSet<String>,
    notifier: &Arc<dyn CheckNotifier>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut current = HashSet::new();
    for vserver in &config.vservers {
        manager
            .update(vserver.name.clone(), wanted_checks(vserver, notifier))
            .await?;
        current.insert(vserver.name.clone());
    }
    for gone in pushed.difference(&current) {
        tracing::info!(vserver = %gone, "Vserver removed");
        manager.update(gone.clone(), HashMap::new()).await?;
    }
    *pushed = current;

    manager.settled().await?;
    let published = manager.configs().map(|cfgs| cfgs.len()).unwrap_or(0);
    tracing::info!(
        configs = published,
        marks = manager.marks().len(),
        "Healthcheck configs published"
    );
    Ok(())
}

fn wanted_checks(
    vserver: &VserverConfig,
    notifier: &Arc<dyn CheckNotifier>,
) -> HashMap<CheckKey, Check> {
    vserver
        .check_keys()
        .into_iter()
        .map(|(key, hc)| {
            let check = Check::new(key.clone(), hc, notifier.clone());
            (key, check)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_change_reported_once() {
        let mut last = CoordinatorConfig::default();
        let resized = CoordinatorConfig {
            mark_size: 64,
            ..CoordinatorConfig::default()
        };

        assert!(!coordinator_changed(&mut last, &CoordinatorConfig::default()));
        assert!(coordinator_changed(&mut last, &resized));
        assert!(!coordinator_changed(&mut last, &resized));
        assert!(coordinator_changed(&mut last, &CoordinatorConfig::default()));
    }
}
