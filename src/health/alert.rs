//! Alert fan-out and summary listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::health::state::HealthStatus;
use crate::health::summary::SystemHealthSummary;
use crate::observability::metrics;

const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Raised when a service's failure streak reaches the alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub service: String,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub error: Option<String>,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
}

/// Broadcast channel for alerts. Subscribers debounce on their own.
#[derive(Debug, Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<HealthAlert>,
}

impl AlertBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthAlert> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers that received the alert.
    pub fn publish(&self, alert: HealthAlert) -> usize {
        tracing::error!(
            service = %alert.service,
            status = %alert.status,
            consecutive_failures = alert.consecutive_failures,
            error = ?alert.error,
            "Health alert"
        );
        metrics::record_alert(&alert.service);
        self.tx.send(alert).unwrap_or(0)
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type SummaryListener = Arc<dyn Fn(&SystemHealthSummary) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(ListenerId, SummaryListener)>,
}

/// Summary listeners, notified in registration order.
#[derive(Default)]
pub struct Listeners {
    inner: Mutex<Registry>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SystemHealthSummary) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let listener: SummaryListener = Arc::new(listener);
        let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.entries.push((id, listener));
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = registry.entries.len();
        registry.entries.retain(|(existing, _)| *existing != id);
        registry.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener; failures and panics are logged and skipped.
    pub fn notify(&self, summary: &SystemHealthSummary) {
        // Listeners run outside the lock so they may (un)register others
        let snapshot: Vec<(ListenerId, SummaryListener)> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .clone();

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(summary))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(listener = id.0, error = %e, "Health summary listener failed"),
                Err(_) => tracing::error!(listener = id.0, "Health summary listener panicked"),
            }
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}
