/// Page hook trait and the typed hook table.
///
/// Each plugin may register at most one hook per phase. The table is owned
/// by the page guard and handed out by reference; there is no global
/// registry.
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{PagePayload, PagePhase};

// ---------------------------------------------------------------------------
// Hook trait
// ---------------------------------------------------------------------------

/// A hook that runs when a plugin's page is entered or left.
#[async_trait]
pub trait PageHook: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    async fn run(&self, payload: &PagePayload) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type HookKey = (String, PagePhase);
type HookMap = HashMap<HookKey, Arc<dyn PageHook>>;

#[derive(Default, Clone)]
pub struct PageHookRegistry {
    hooks: Arc<RwLock<HookMap>>,
}

impl PageHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `plugin_id` at `phase`, returning any hook it replaced.
    pub async fn register(
        &self,
        plugin_id: &str,
        phase: PagePhase,
        hook: Arc<dyn PageHook>,
    ) -> Option<Arc<dyn PageHook>> {
        debug!("[PageHooks] {} registered for {} ({:?})", hook.name(), plugin_id, phase);
        let mut map = self.hooks.write().await;
        map.insert((plugin_id.to_string(), phase), hook)
    }

    pub async fn get(&self, plugin_id: &str, phase: PagePhase) -> Option<Arc<dyn PageHook>> {
        let map = self.hooks.read().await;
        map.get(&(plugin_id.to_string(), phase)).cloned()
    }
}
