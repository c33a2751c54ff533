/// Plugin registry: the single source of truth for plugin metadata and state.
///
/// Every successful mutation publishes a lifecycle event while the write
/// lock is still held, so a subscriber that reacts to an event always reads
/// a state at least as fresh as that event.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use deskforge_core::{
    EventBus, HostError, HostResult, LifecycleEvent, LifecycleEventKind, PluginFlags,
    PluginMetadata, PluginRecord, PluginRuntimeState, PluginSnapshot, PluginState,
};

#[derive(Default)]
struct RegistryInner {
    /// Registration order.
    order: Vec<String>,
    records: HashMap<String, PluginRecord>,
}

pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
    bus: Arc<EventBus>,
}

impl PluginRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { inner: RwLock::new(RegistryInner::default()), bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Register with default flags (page shown in the menu).
    pub async fn register(&self, metadata: PluginMetadata) -> HostResult<()> {
        self.register_with(metadata, PluginFlags::default()).await
    }

    pub async fn register_with(&self, metadata: PluginMetadata, flags: PluginFlags) -> HostResult<()> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&metadata.id) {
            warn!("[Plugins] Duplicate registration rejected: {}", metadata.id);
            return Err(HostError::DuplicateRegistration(metadata.id));
        }

        let id = metadata.id.clone();
        info!("[Plugins] Registered: {} v{}", id, metadata.version);
        inner.order.push(id.clone());
        inner.records.insert(
            id.clone(),
            PluginRecord {
                metadata,
                runtime: PluginRuntimeState { flags, ..Default::default() },
            },
        );
        self.bus.publish_lifecycle(LifecycleEvent::new(id, LifecycleEventKind::Registered));
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<PluginRecord> {
        self.inner.read().await.records.get(id).cloned()
    }

    pub async fn state(&self, id: &str) -> Option<PluginState> {
        self.inner.read().await.records.get(id).map(|r| r.runtime.state)
    }

    /// All records in registration order.
    pub async fn list(&self) -> Vec<PluginRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Read-only projection for the UI, in registration order.
    pub async fn snapshot(&self) -> Vec<PluginSnapshot> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).map(PluginRecord::snapshot))
            .collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// The only state mutation path. Reserved for the lifecycle manager.
    pub(crate) async fn set_state(
        &self,
        id: &str,
        state: PluginState,
        detail: Option<String>,
    ) -> HostResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| HostError::UnknownPluginId(id.to_string()))?;

        let previous = record.runtime.state;
        record.runtime.state = state;
        record.runtime.last_error = match state {
            PluginState::Error => detail.clone(),
            _ => None,
        };
        debug!("[Plugins] {}: {} -> {}", id, previous, state);

        let mut event = LifecycleEvent::new(id, event_kind(state));
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.bus.publish_lifecycle(event);
        Ok(())
    }
}

fn event_kind(state: PluginState) -> LifecycleEventKind {
    match state {
        PluginState::Installed => LifecycleEventKind::Registered,
        PluginState::Enabled => LifecycleEventKind::Enabled,
        PluginState::Disabled => LifecycleEventKind::Disabled,
        PluginState::Error => LifecycleEventKind::Error,
    }
}
