//! Notification sink shared by the provider and the row store
//!
//! A monitor is handed to each component at construction time. The default
//! implementation forwards everything to `tracing`; `MemoryMonitor` keeps the
//! notifications around so tests can assert on them.

use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub severity: Severity,
    pub correlation_id: Option<String>,
    pub message: String,
}

impl Notification {
    pub fn new(severity: Severity, correlation_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity,
            correlation_id: correlation_id.map(str::to_string),
            message: message.into(),
        }
    }
}

pub trait Monitor: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Convenience helpers usable through `dyn Monitor`
pub trait MonitorExt {
    fn information(&self, correlation_id: Option<&str>, message: impl Into<String>);
    fn warning(&self, correlation_id: Option<&str>, message: impl Into<String>);
    fn error(&self, correlation_id: Option<&str>, message: impl Into<String>);
}

impl MonitorExt for dyn Monitor {
    fn information(&self, correlation_id: Option<&str>, message: impl Into<String>) {
        self.notify(Notification::new(Severity::Information, correlation_id, message));
    }

    fn warning(&self, correlation_id: Option<&str>, message: impl Into<String>) {
        self.notify(Notification::new(Severity::Warning, correlation_id, message));
    }

    fn error(&self, correlation_id: Option<&str>, message: impl Into<String>) {
        self.notify(Notification::new(Severity::Error, correlation_id, message));
    }
}

/// Forwards notifications to the `tracing` subscriber
#[derive(Debug, Default, Clone)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn notify(&self, notification: Notification) {
        let correlation_id = notification.correlation_id.as_deref().unwrap_or("-");
        match notification.severity {
            Severity::Information => {
                info!(target: "provisioning", correlation_id, "{}", notification.message)
            }
            Severity::Warning => {
                warn!(target: "provisioning", correlation_id, "{}", notification.message)
            }
            Severity::Error => {
                error!(target: "provisioning", correlation_id, "{}", notification.message)
            }
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct MemoryMonitor {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.severity == severity)
            .collect()
    }
}

impl Monitor for MemoryMonitor {
    fn notify(&self, notification: Notification) {
        match self.notifications.lock() {
            Ok(mut guard) => guard.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
