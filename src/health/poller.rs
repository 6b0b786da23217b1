//! Periodic multi-service health polling.
//!
//! # Responsibilities
//! - Probe every configured dependency concurrently on a fixed interval
//! - Record results in bounded per-service histories
//! - Compute the aggregate summary and publish it to listeners
//! - Raise alerts for services at or above the failure threshold
//! - Downgrade healthy probes whose origin the attached client considers unhealthy

use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthConfig;
use crate::health::alert::{AlertBus, HealthAlert, ListenerError, ListenerId, Listeners};
use crate::health::check::{probe_with_retries, ServiceDependency};
use crate::health::state::{HealthCheckResult, HealthStatus, ProbePhase, ServiceHistory};
use crate::health::summary::{aggregate_status, SystemHealthSummary};
use crate::observability::metrics;
use crate::resilience::client::target_for;
use crate::resilience::context::unix_millis;
use crate::resilience::ResilientClient;
use crate::transport::HttpTransport;

struct RunningTask {
    stop_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Health check poller.
///
/// Construct with [`HealthPoller::new`], wrap in an `Arc`, then [`start`](Self::start).
pub struct HealthPoller {
    config: HealthConfig,
    transport: Arc<dyn HttpTransport>,
    client: Option<Arc<ResilientClient>>,
    dependencies: RwLock<Vec<ServiceDependency>>,
    histories: DashMap<String, ServiceHistory>,
    alerts: AlertBus,
    listeners: Listeners,
    last_summary: ArcSwapOption<SystemHealthSummary>,
    /// Serializes cycles; a cycle never overlaps another.
    cycle_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<RunningTask>>,
    created_at: Instant,
}

impl HealthPoller {
    pub fn new(config: HealthConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let dependencies = config
            .dependencies
            .iter()
            .map(|dep| ServiceDependency::from_config(dep, config.timeout()))
            .collect();
        Self {
            config,
            transport,
            client: None,
            dependencies: RwLock::new(dependencies),
            histories: DashMap::new(),
            alerts: AlertBus::new(),
            listeners: Listeners::new(),
            last_summary: ArcSwapOption::empty(),
            cycle_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
            created_at: Instant::now(),
        }
    }

    /// Consult `client` for every probed origin it has called.
    pub fn with_client(mut self, client: Arc<ResilientClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Time since the poller was created.
    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Start the recurring timer. The first cycle runs immediately.
    ///
    /// Returns `false` if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let poller = Arc::clone(self);
        let interval = self.config.interval();

        tracing::info!(
            interval = ?interval,
            dependencies = self.dependency_count(),
            "Health poller starting"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.recv() => {
                        tracing::info!("Health poller received stop signal, exiting loop");
                        break;
                    }
                    _ = ticker.tick() => {
                        poller.run_cycle().await;
                    }
                }
            }
        });

        *task = Some(RunningTask { stop_tx, handle });
        true
    }

    /// Cancel the timer. An in-flight cycle finishes naturally.
    ///
    /// Returns `false` if the poller was not running.
    pub fn stop(&self) -> bool {
        match self.take_task() {
            Some(task) => {
                let _ = task.stop_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the polling task (and any in-flight cycle) to end.
    pub async fn shutdown(&self) {
        if let Some(task) = self.take_task() {
            let _ = task.stop_tx.send(());
            if let Err(e) = task.handle.await {
                tracing::error!(error = %e, "Health poller task failed");
            }
        }
    }

    fn take_task(&self) -> Option<RunningTask> {
        self.task.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Add a dependency, replacing any existing one with the same name.
    pub fn add_dependency(&self, dependency: ServiceDependency) {
        let mut deps = self.dependencies.write().unwrap_or_else(|e| e.into_inner());
        tracing::info!(service = %dependency.name, critical = dependency.critical, "Dependency added");
        match deps.iter_mut().find(|d| d.name == dependency.name) {
            Some(existing) => *existing = dependency,
            None => deps.push(dependency),
        }
    }

    /// Remove a dependency and its history.
    pub fn remove_dependency(&self, name: &str) -> bool {
        let mut deps = self.dependencies.write().unwrap_or_else(|e| e.into_inner());
        let before = deps.len();
        deps.retain(|d| d.name != name);
        let removed = deps.len() != before;
        if removed {
            self.histories.remove(name);
            tracing::info!(service = %name, "Dependency removed");
        }
        removed
    }

    /// Replace the whole dependency set; histories of kept services survive.
    pub fn set_dependencies(&self, dependencies: Vec<ServiceDependency>) {
        let mut deps = self.dependencies.write().unwrap_or_else(|e| e.into_inner());
        self.histories
            .retain(|name, _| dependencies.iter().any(|d| &d.name == name));
        tracing::info!(count = dependencies.len(), "Dependency set replaced");
        *deps = dependencies;
    }

    pub fn dependencies(&self) -> Vec<ServiceDependency> {
        self.dependencies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run an out-of-band cycle now. The schedule is unaffected.
    pub async fn get_current_health(&self) -> SystemHealthSummary {
        self.run_cycle().await
    }

    /// Probe all dependencies in parallel and publish the summary.
    pub async fn run_cycle(&self) -> SystemHealthSummary {
        let _cycle = self.cycle_lock.lock().await;
        let dependencies = self.dependencies();

        for dep in &dependencies {
            self.histories
                .entry(dep.name.clone())
                .or_insert_with(|| ServiceHistory::new(self.config.history_limit))
                .begin_probe();
        }

        let transport = self.transport.as_ref();
        let probes = dependencies.iter().map(|dep| async move {
            let result = probe_with_retries(
                transport,
                &dep.check,
                self.config.retries,
                self.config.retry_delay(),
            )
            .await;
            (dep, result)
        });
        let outcomes = join_all(probes).await;

        let mut entries = Vec::with_capacity(outcomes.len());
        let mut results = Vec::with_capacity(outcomes.len());
        let mut alerts = Vec::new();
        for (dep, mut result) in outcomes {
            self.apply_client_view(dep, &mut result);
            metrics::record_health(
                &dep.name,
                result.status,
                std::time::Duration::from_millis(result.response_time_ms),
            );

            // Removed while probing: report it this once, keep no history
            let streak = match self.histories.get_mut(&dep.name) {
                Some(mut history) => history.record(result.clone()),
                None => 0,
            };
            if streak >= self.config.alert_threshold {
                alerts.push(HealthAlert {
                    service: dep.name.clone(),
                    status: result.status,
                    consecutive_failures: streak,
                    error: result.error.clone(),
                    timestamp: result.timestamp,
                });
            }

            entries.push((dep.critical, result.status));
            results.push(result);
        }

        for alert in alerts {
            self.alerts.publish(alert);
        }

        let summary = SystemHealthSummary {
            overall: aggregate_status(entries),
            services: results,
            uptime_secs: self.uptime().as_secs(),
            version: self.config.version.clone(),
            timestamp: unix_millis(),
            environment: self.config.environment.clone(),
        };
        tracing::info!(
            overall = %summary.overall,
            services = summary.services.len(),
            "Health cycle complete"
        );

        self.last_summary.store(Some(Arc::new(summary.clone())));
        self.listeners.notify(&summary);
        summary
    }

    /// A reachable dependency is still degraded when the client's own calls to it are failing.
    fn apply_client_view(&self, dep: &ServiceDependency, result: &mut HealthCheckResult) {
        let Some(client) = &self.client else { return };
        if result.status != HealthStatus::Healthy {
            return;
        }
        let Ok(url) = url::Url::parse(&dep.check.url) else { return };
        let origin = target_for(&url);
        if !client.targets().contains(&origin) || client.is_healthy(&origin) {
            return;
        }
        tracing::warn!(service = %dep.name, upstream = %origin, "Probe healthy but client calls failing");
        result.status = HealthStatus::Degraded;
        result.error = Some(format!(
            "client unhealthy for {} (circuit {})",
            origin,
            client.circuit_state(&origin)
        ));
    }

    /// Most recent summary, if any cycle has completed.
    pub fn last_summary(&self) -> Option<Arc<SystemHealthSummary>> {
        self.last_summary.load_full()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<HealthAlert> {
        self.alerts.subscribe()
    }

    /// Register a summary listener; listeners run in registration order.
    pub fn on_summary<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SystemHealthSummary) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Up to `limit` most recent results for a service, oldest first.
    pub fn service_history(&self, name: &str, limit: usize) -> Vec<HealthCheckResult> {
        self.histories
            .get(name)
            .map(|h| h.recent(limit))
            .unwrap_or_default()
    }

    pub fn service_uptime(&self, name: &str) -> Option<f64> {
        self.histories.get(name).and_then(|h| h.uptime_percent())
    }

    pub fn average_response_time(&self, name: &str) -> Option<f64> {
        self.histories.get(name).and_then(|h| h.average_response_time_ms())
    }

    pub fn consecutive_failures(&self, name: &str) -> u32 {
        self.histories
            .get(name)
            .map(|h| h.consecutive_failures())
            .unwrap_or(0)
    }

    pub fn probe_phase(&self, name: &str) -> ProbePhase {
        self.histories
            .get(name)
            .map(|h| h.phase())
            .unwrap_or(ProbePhase::Idle)
    }
}

impl std::fmt::Debug for HealthPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthPoller")
            .field("interval_secs", &self.config.interval_secs)
            .field("dependencies", &self.dependency_count())
            .field("running", &self.is_running())
            .finish()
    }
}
