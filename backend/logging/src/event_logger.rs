//! Lifecycle Event Logger
//!
//! Consumes the bus's lifecycle topic and writes one structured record per
//! event under the `lifecycle_events` target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use deskforge_core::{
    EventBus, LifecycleEvent, LifecycleEventKind, SubscriptionHandle, LIFECYCLE_TOPIC,
};

use crate::redact::redact_sensitive_data;

pub const LOG_TARGET: &str = "lifecycle_events";

#[derive(Debug, Serialize, PartialEq)]
pub struct LifecycleLogEntry {
    pub plugin_id: String,
    pub kind: LifecycleEventKind,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&LifecycleEvent> for LifecycleLogEntry {
    fn from(event: &LifecycleEvent) -> Self {
        Self {
            plugin_id: event.plugin_id.clone(),
            kind: event.kind,
            detail: event.detail.as_deref().map(redact_sensitive_data),
            timestamp: event.timestamp,
        }
    }
}

/// Bus consumer that logs every lifecycle event until dropped.
pub struct LifecycleEventLogger {
    bus: Arc<EventBus>,
    handle: SubscriptionHandle,
}

impl LifecycleEventLogger {
    /// Attach to `bus`. Must be called from within a Tokio runtime.
    pub fn attach(bus: Arc<EventBus>) -> Self {
        let handle = bus.subscribe_with(LIFECYCLE_TOPIC, |payload| async move {
            if let Some(event) = payload.as_lifecycle() {
                Self::log_event(event);
            }
            Ok(())
        });
        Self { bus, handle }
    }

    /// Record one event. Failure details are redacted first.
    pub fn log_event(event: &LifecycleEvent) -> LifecycleLogEntry {
        let entry = LifecycleLogEntry::from(event);
        let detail = entry.detail.as_deref().unwrap_or("");
        match entry.kind {
            LifecycleEventKind::Error => warn!(
                target: LOG_TARGET,
                plugin = %entry.plugin_id,
                kind = %entry.kind,
                detail,
                at = %entry.timestamp,
                "Plugin lifecycle error"
            ),
            _ => info!(
                target: LOG_TARGET,
                plugin = %entry.plugin_id,
                kind = %entry.kind,
                detail,
                at = %entry.timestamp,
                "Plugin lifecycle event"
            ),
        }
        entry
    }
}

impl Drop for LifecycleEventLogger {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.handle);
    }
}
