//! Hot reload of the dependency set.
//!
//! Only `health.dependencies` (and the default probe timeout they inherit) is
//! reloadable. Everything else requires a restart.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{DependencyConfig, HealthConfig};
use crate::health::ServiceDependency;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Bursts of file events inside this window collapse into one reload.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// The reloadable part of the health config as last applied.
#[derive(Debug, Clone, PartialEq)]
struct AppliedDependencies {
    dependencies: Vec<DependencyConfig>,
    timeout_ms: u64,
}

impl AppliedDependencies {
    fn of(health: &HealthConfig) -> Self {
        Self {
            dependencies: health.dependencies.clone(),
            timeout_ms: health.timeout_ms,
        }
    }

    /// Record `health` and return the new dependency set, or `None` if nothing changed.
    fn update(&mut self, health: &HealthConfig) -> Option<Vec<ServiceDependency>> {
        let next = Self::of(health);
        if next == *self {
            return None;
        }
        *self = next;
        Some(
            health
                .dependencies
                .iter()
                .map(|dep| ServiceDependency::from_config(dep, health.timeout()))
                .collect(),
        )
    }
}

/// Watches the config file and emits dependency sets that differ from the running one.
pub struct ConfigWatcher {
    path: PathBuf,
    applied: AppliedDependencies,
    update_tx: mpsc::UnboundedSender<Vec<ServiceDependency>>,
}

impl ConfigWatcher {
    /// `current` is the health config the poller was started with.
    pub fn new(
        path: &Path,
        current: &HealthConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<ServiceDependency>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                applied: AppliedDependencies::of(current),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Must be called inside a tokio runtime.
    ///
    /// The parent directory is watched so editors that save by rename are seen.
    /// Updates stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let file_name: Option<OsString> = self.path.file_name().map(OsString::from);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if ours && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        tokio::spawn(self.reload_loop(event_rx));
        Ok(watcher)
    }

    async fn reload_loop(mut self, mut events: mpsc::UnboundedReceiver<()>) {
        while events.recv().await.is_some() {
            tokio::time::sleep(DEBOUNCE).await;
            while events.try_recv().is_ok() {}

            let config = match load_config(&self.path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload config, keeping current dependencies");
                    continue;
                }
            };
            match self.applied.update(&config.health) {
                Some(dependencies) => {
                    tracing::info!(count = dependencies.len(), "Dependency set changed on disk");
                    if self.update_tx.send(dependencies).is_err() {
                        break;
                    }
                }
                None => tracing::debug!("Config rewritten without dependency changes"),
            }
        }
    }
}
