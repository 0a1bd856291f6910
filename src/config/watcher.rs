//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::EngineConfig;

/// Watches the configuration file and emits each changed, valid config.
pub struct ConfigWatcher {
    path: PathBuf,
    current: EngineConfig,
    update_tx: mpsc::UnboundedSender<EngineConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// `current` is the config already in effect; reloads that parse to the
    /// same value are not forwarded.
    pub fn new(
        path: &Path,
        current: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors replacing the file by rename are noticed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let ConfigWatcher {
            path,
            current,
            update_tx,
        } = self;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());
        let last = Mutex::new(current);
        let watch_path = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                if !event.paths.iter().any(|p| p.file_name() == file_name.as_deref()) {
                    return;
                }

                match load_config(&watch_path) {
                    Ok(new_config) => {
                        forward_reload(&last, &update_tx, new_config);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

/// Sends `new_config` on if it differs from the last one seen.
///
/// Returns whether the config reached the receiver.
fn forward_reload(
    last: &Mutex<EngineConfig>,
    update_tx: &mpsc::UnboundedSender<EngineConfig>,
    new_config: EngineConfig,
) -> bool {
    let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
    if *last == new_config {
        tracing::debug!("Config file touched but unchanged");
        return false;
    }
    tracing::info!(vservers = new_config.vservers.len(), "Config file changed, reloading");
    *last = new_config.clone();
    if update_tx.send(new_config).is_err() {
        tracing::debug!("Config update receiver closed, dropping reload");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_queue_size(queue_size: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.coordinator.queue_size = queue_size;
        config
    }

    #[test]
    fn test_forward_reload_skips_unchanged() {
        let last = Mutex::new(EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!forward_reload(&last, &tx, EngineConfig::default()));
        assert!(rx.try_recv().is_err());

        assert!(forward_reload(&last, &tx, with_queue_size(10)));
        assert_eq!(rx.try_recv().unwrap(), with_queue_size(10));
        assert!(!forward_reload(&last, &tx, with_queue_size(10)));
    }

    #[test]
    fn test_forward_reload_receiver_gone() {
        let last = Mutex::new(EngineConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        assert!(!forward_reload(&last, &tx, with_queue_size(10)));
        assert_eq!(*last.lock().unwrap(), with_queue_size(10));
    }
}
