//! Plugin SDK
//!
//! The boundary every concrete plugin (calculator, clock, bookmarks, ...)
//! implements. The host only drives these hooks; what a plugin does inside
//! them is its own business.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use deskforge_core::{plugin_topic, BusPayload, EventBus, PluginFlags, PluginMetadata};
use deskforge_hooks::{PageHook, PagePhase};

/// Handle given to a plugin at startup for publishing on its own topic.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    bus: Arc<EventBus>,
}

impl PluginContext {
    pub fn new(plugin_id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self { plugin_id: plugin_id.into(), bus }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Publish `value` on `plugin.<id>`. Returns how many subscribers got it.
    pub fn emit(&self, value: serde_json::Value) -> usize {
        self.bus.publish(
            &plugin_topic(&self.plugin_id),
            BusPayload::Emission {
                plugin_id: self.plugin_id.clone(),
                value,
            },
        )
    }
}

/// Capability object implemented by each plugin.
#[async_trait]
pub trait PluginCapability: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Presentation flags recorded at registration.
    fn flags(&self) -> PluginFlags {
        PluginFlags::default()
    }

    /// Prepare internal resources. Called at most once successfully;
    /// return an error when a required system capability is missing.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn startup(&self, ctx: &PluginContext) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    /// Interval of the background task run while the plugin is enabled.
    fn periodic_interval(&self) -> Option<Duration> {
        None
    }

    /// One step of the background task. `Some` values are emitted on the
    /// plugin's topic.
    async fn tick(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Hooks to run when the plugin's page is entered or left.
    fn page_hooks(&self) -> Vec<(PagePhase, Arc<dyn PageHook>)> {
        Vec::new()
    }
}
