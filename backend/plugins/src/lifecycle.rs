//! Plugin lifecycle manager.
//!
//! Drives the per-plugin state machine:
//!
//! ```text
//! Installed ──► Enabled ◄──► Disabled
//!      └───────────┴────────────┴──► Error ──(retry)──► Enabled
//! ```
//!
//! Transitions of one plugin are serialized by that plugin's transition
//! lock, held across the startup/shutdown hook so each Enabled period sees
//! exactly one startup and one shutdown. Different plugins never contend.
//! The registry lock is only taken for the flag flip and its event.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use deskforge_core::{EventBus, HookName, HostError, HostResult, PluginState};

use crate::periodic::PeriodicTask;
use crate::registry::PluginRegistry;
use crate::sdk::{PluginCapability, PluginContext};

#[derive(Default)]
struct TransitionState {
    initialized: bool,
    periodic: Option<PeriodicTask>,
}

struct PluginSlot {
    capability: Arc<dyn PluginCapability>,
    transition: Mutex<TransitionState>,
}

pub struct LifecycleManager {
    registry: Arc<PluginRegistry>,
    slots: RwLock<HashMap<String, Arc<PluginSlot>>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry, slots: RwLock::new(HashMap::new()) }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.registry.bus()
    }

    /// Register a capability's metadata and keep the capability for later
    /// transitions. The plugin starts out Installed.
    pub async fn install(&self, capability: Arc<dyn PluginCapability>) -> HostResult<()> {
        let metadata = capability.metadata().clone();
        let mut slots = self.slots.write().await;
        if slots.contains_key(&metadata.id) {
            return Err(HostError::DuplicateRegistration(metadata.id));
        }
        let id = metadata.id.clone();
        self.registry.register_with(metadata, capability.flags()).await?;
        slots.insert(
            id,
            Arc::new(PluginSlot { capability, transition: Mutex::new(TransitionState::default()) }),
        );
        Ok(())
    }

    pub async fn state(&self, id: &str) -> HostResult<PluginState> {
        self.registry
            .state(id)
            .await
            .ok_or_else(|| HostError::UnknownPluginId(id.to_string()))
    }

    /// Prepare the plugin's resources. Idempotent.
    pub async fn init(&self, id: &str) -> HostResult<()> {
        let slot = self.slot(id).await?;
        let mut transition = slot.transition.lock().await;
        init_locked(id, &slot, &mut transition).await
    }

    /// Enable or disable a plugin, returning the state it ends up in.
    ///
    /// Enabling an Enabled plugin and disabling one that is not Enabled are
    /// no-ops. A failing hook moves the plugin to Error and is returned as
    /// [`HostError::LifecycleHook`]; nothing else is affected.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> HostResult<PluginState> {
        let slot = self.slot(id).await?;
        let mut transition = slot.transition.lock().await;
        let current = self.state(id).await?;

        if enabled {
            self.enable_locked(id, &slot, &mut transition, current).await
        } else {
            self.disable_locked(id, &slot, &mut transition, current).await
        }
    }

    /// Re-attempt startup of a plugin in the Error state.
    pub async fn retry(&self, id: &str) -> HostResult<PluginState> {
        let current = self.state(id).await?;
        if current != PluginState::Error {
            debug!(plugin = id, state = %current, "Retry requested outside Error state, ignoring");
            return Ok(current);
        }
        info!(plugin = id, "Retrying plugin startup");
        self.set_enabled(id, true).await
    }

    /// Disable every Enabled plugin, newest first. Failures are logged.
    pub async fn shutdown_all(&self) {
        for id in self.registry.ids().await.into_iter().rev() {
            if self.registry.state(&id).await != Some(PluginState::Enabled) {
                continue;
            }
            if let Err(e) = self.set_enabled(&id, false).await {
                warn!(plugin = %id, error = %e, "Shutdown during host exit failed");
            }
        }
    }

    async fn slot(&self, id: &str) -> HostResult<Arc<PluginSlot>> {
        self.slots
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::UnknownPluginId(id.to_string()))
    }

    async fn enable_locked(
        &self,
        id: &str,
        slot: &PluginSlot,
        transition: &mut TransitionState,
        current: PluginState,
    ) -> HostResult<PluginState> {
        if current == PluginState::Enabled {
            debug!(plugin = id, "Already enabled");
            return Ok(current);
        }

        if let Err(e) = init_locked(id, slot, transition).await {
            self.registry.set_state(id, PluginState::Error, Some(e.to_string())).await?;
            return Err(e);
        }

        let ctx = PluginContext::new(id, Arc::clone(self.bus()));
        match contained(slot.capability.startup(&ctx)).await {
            Ok(()) => {
                self.registry.set_state(id, PluginState::Enabled, None).await?;
                if let Some(interval) = slot.capability.periodic_interval() {
                    transition.periodic =
                        Some(PeriodicTask::spawn(Arc::clone(&slot.capability), ctx, interval));
                }
                info!(plugin = id, from = %current, "Plugin enabled");
                Ok(PluginState::Enabled)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(plugin = id, error = %message, "Startup hook failed");
                self.registry.set_state(id, PluginState::Error, Some(message.clone())).await?;
                Err(HostError::LifecycleHook {
                    plugin_id: id.to_string(),
                    hook: HookName::Startup,
                    message,
                })
            }
        }
    }

    async fn disable_locked(
        &self,
        id: &str,
        slot: &PluginSlot,
        transition: &mut TransitionState,
        current: PluginState,
    ) -> HostResult<PluginState> {
        if current != PluginState::Enabled {
            debug!(plugin = id, state = %current, "Not enabled, nothing to stop");
            return Ok(current);
        }

        if let Some(task) = transition.periodic.take() {
            task.stop().await;
        }

        match contained(slot.capability.shutdown()).await {
            Ok(()) => {
                self.registry.set_state(id, PluginState::Disabled, None).await?;
                info!(plugin = id, "Plugin disabled");
                Ok(PluginState::Disabled)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(plugin = id, error = %message, "Shutdown hook failed");
                self.registry.set_state(id, PluginState::Error, Some(message.clone())).await?;
                Err(HostError::LifecycleHook {
                    plugin_id: id.to_string(),
                    hook: HookName::Shutdown,
                    message,
                })
            }
        }
    }
}

/// Run a plugin hook, turning a panic into an ordinary failure.
async fn contained<F>(hook: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("hook panicked")),
    }
}

async fn init_locked(
    id: &str,
    slot: &PluginSlot,
    transition: &mut TransitionState,
) -> HostResult<()> {
    if transition.initialized {
        return Ok(());
    }
    contained(slot.capability.init()).await.map_err(|e| HostError::Init {
        plugin_id: id.to_string(),
        message: e.to_string(),
    })?;
    transition.initialized = true;
    debug!(plugin = id, "Plugin initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use deskforge_core::{LifecycleEventKind, PluginMetadata, LIFECYCLE_TOPIC};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        inits: AtomicU64,
        startups: AtomicU64,
        shutdowns: AtomicU64,
        ticks: AtomicU64,
        fail_init: AtomicBool,
        fail_startup: AtomicBool,
        fail_shutdown: AtomicBool,
    }

    struct MockPlugin {
        metadata: PluginMetadata,
        probe: Arc<Probe>,
        startup_delay: Duration,
        interval: Option<Duration>,
    }

    impl MockPlugin {
        fn new(id: &str) -> (Arc<Self>, Arc<Probe>) {
            let probe = Arc::new(Probe::default());
            let plugin = Arc::new(Self {
                metadata: PluginMetadata::new(id, id),
                probe: Arc::clone(&probe),
                startup_delay: Duration::ZERO,
                interval: None,
            });
            (plugin, probe)
        }

        fn with(id: &str, startup_delay: Duration, interval: Option<Duration>) -> (Arc<Self>, Arc<Probe>) {
            let probe = Arc::new(Probe::default());
            let plugin = Arc::new(Self {
                metadata: PluginMetadata::new(id, id),
                probe: Arc::clone(&probe),
                startup_delay,
                interval,
            });
            (plugin, probe)
        }
    }

    #[async_trait]
    impl PluginCapability for MockPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn init(&self) -> Result<()> {
            self.probe.inits.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_init.load(Ordering::SeqCst) {
                anyhow::bail!("screen capture unavailable");
            }
            Ok(())
        }

        async fn startup(&self, _ctx: &PluginContext) -> Result<()> {
            self.probe.startups.fetch_add(1, Ordering::SeqCst);
            if !self.startup_delay.is_zero() {
                tokio::time::sleep(self.startup_delay).await;
            }
            if self.probe.fail_startup.load(Ordering::SeqCst) {
                anyhow::bail!("startup refused");
            }
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_shutdown.load(Ordering::SeqCst) {
                anyhow::bail!("shutdown refused");
            }
            Ok(())
        }

        fn periodic_interval(&self) -> Option<Duration> {
            self.interval
        }

        async fn tick(&self) -> Result<Option<serde_json::Value>> {
            let n = self.probe.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(Some(serde_json::json!({ "tick": n })))
        }
    }

    fn manager() -> LifecycleManager {
        let bus = Arc::new(EventBus::new());
        LifecycleManager::new(Arc::new(PluginRegistry::new(bus)))
    }

    #[tokio::test]
    async fn test_install_duplicate_rejected() {
        let manager = manager();
        let (first, _) = MockPlugin::new("calc.builtin");
        let (second, _) = MockPlugin::new("calc.builtin");
        manager.install(first).await.unwrap();

        let err = manager.install(second).await.unwrap_err();
        assert!(matches!(err, HostError::DuplicateRegistration(_)));
        assert_eq!(manager.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_enable_twice_starts_once() {
        let manager = manager();
        let mut events = manager.bus().subscribe(LIFECYCLE_TOPIC);
        let (plugin, probe) = MockPlugin::new("calc.builtin");
        manager.install(plugin).await.unwrap();

        assert_eq!(manager.set_enabled("calc.builtin", true).await.unwrap(), PluginState::Enabled);
        assert_eq!(manager.set_enabled("calc.builtin", true).await.unwrap(), PluginState::Enabled);
        assert_eq!(probe.startups.load(Ordering::SeqCst), 1);
        assert_eq!(probe.inits.load(Ordering::SeqCst), 1);

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv())
            .filter_map(|p| p.as_lifecycle().map(|e| e.kind))
            .collect();
        assert_eq!(kinds, vec![LifecycleEventKind::Registered, LifecycleEventKind::Enabled]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enable_starts_once() {
        let manager = Arc::new(manager());
        let (plugin, probe) = MockPlugin::with("clock.builtin", Duration::from_millis(20), None);
        manager.install(plugin).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.set_enabled("clock.builtin", true).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), PluginState::Enabled);
        }

        assert_eq!(probe.startups.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state("clock.builtin").await.unwrap(), PluginState::Enabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disable_stops_once() {
        let manager = Arc::new(manager());
        let (plugin, probe) =
            MockPlugin::with("clock.builtin", Duration::ZERO, Some(Duration::from_millis(5)));
        manager.install(plugin).await.unwrap();
        manager.set_enabled("clock.builtin", true).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.set_enabled("clock.builtin", false).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), PluginState::Disabled);
        }

        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state("clock.builtin").await.unwrap(), PluginState::Disabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_enable_disable_stays_balanced() {
        let manager = Arc::new(manager());
        let (plugin, probe) = MockPlugin::with("calc.builtin", Duration::from_millis(2), None);
        manager.install(plugin).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.set_enabled("calc.builtin", i % 2 == 0).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let startups = probe.startups.load(Ordering::SeqCst);
        let shutdowns = probe.shutdowns.load(Ordering::SeqCst);
        let running = startups - shutdowns;
        assert!(running <= 1, "startups={startups} shutdowns={shutdowns}");

        let expected = if running == 1 {
            PluginState::Enabled
        } else {
            PluginState::Disabled
        };
        assert_eq!(manager.state("calc.builtin").await.unwrap(), expected);
        assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disable_runs_shutdown_once() {
        let manager = manager();
        let (plugin, probe) = MockPlugin::new("bookmarks.builtin");
        manager.install(plugin).await.unwrap();
        manager.set_enabled("bookmarks.builtin", true).await.unwrap();

        assert_eq!(
            manager.set_enabled("bookmarks.builtin", false).await.unwrap(),
            PluginState::Disabled
        );
        assert_eq!(
            manager.set_enabled("bookmarks.builtin", false).await.unwrap(),
            PluginState::Disabled
        );
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);

        // Disabled -> Enabled starts again, without a second init.
        manager.set_enabled("bookmarks.builtin", true).await.unwrap();
        assert_eq!(probe.startups.load(Ordering::SeqCst), 2);
        assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disable_installed_is_noop() {
        let manager = manager();
        let (plugin, probe) = MockPlugin::new("a");
        manager.install(plugin).await.unwrap();

        assert_eq!(manager.set_enabled("a", false).await.unwrap(), PluginState::Installed);
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_startup_failure_sets_error_and_retry_recovers() {
        let manager = manager();
        let mut events = manager.bus().subscribe(LIFECYCLE_TOPIC);
        let (plugin, probe) = MockPlugin::new("ip.external");
        probe.fail_startup.store(true, Ordering::SeqCst);
        manager.install(plugin).await.unwrap();

        let err = manager.set_enabled("ip.external", true).await.unwrap_err();
        assert!(matches!(err, HostError::LifecycleHook { hook: HookName::Startup, .. }));
        assert_eq!(manager.state("ip.external").await.unwrap(), PluginState::Error);
        let record = manager.registry().get("ip.external").await.unwrap();
        assert_eq!(record.runtime.last_error.as_deref(), Some("startup refused"));

        let error_event = std::iter::from_fn(|| events.try_recv())
            .filter_map(|p| p.as_lifecycle().cloned())
            .find(|e| e.kind == LifecycleEventKind::Error)
            .unwrap();
        assert_eq!(error_event.detail.as_deref(), Some("startup refused"));

        // Error is not left by disabling.
        assert_eq!(manager.set_enabled("ip.external", false).await.unwrap(), PluginState::Error);
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 0);

        probe.fail_startup.store(false, Ordering::SeqCst);
        assert_eq!(manager.retry("ip.external").await.unwrap(), PluginState::Enabled);
        assert_eq!(probe.startups.load(Ordering::SeqCst), 2);

        // Retry outside Error does nothing.
        assert_eq!(manager.retry("ip.external").await.unwrap(), PluginState::Enabled);
        assert_eq!(probe.startups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_failure_sets_error() {
        let manager = manager();
        let (plugin, probe) = MockPlugin::new("proc.builtin");
        probe.fail_shutdown.store(true, Ordering::SeqCst);
        manager.install(plugin).await.unwrap();
        manager.set_enabled("proc.builtin", true).await.unwrap();

        let err = manager.set_enabled("proc.builtin", false).await.unwrap_err();
        assert!(matches!(err, HostError::LifecycleHook { hook: HookName::Shutdown, .. }));
        assert_eq!(manager.state("proc.builtin").await.unwrap(), PluginState::Error);
    }

    #[tokio::test]
    async fn test_init_is_idempotent_and_failure_is_typed() {
        let manager = manager();
        let (plugin, probe) = MockPlugin::new("screenshot.builtin");
        manager.install(plugin).await.unwrap();

        probe.fail_init.store(true, Ordering::SeqCst);
        let err = manager.init("screenshot.builtin").await.unwrap_err();
        assert!(matches!(err, HostError::Init { .. }));
        assert_eq!(manager.state("screenshot.builtin").await.unwrap(), PluginState::Installed);

        // Enabling with a missing prerequisite lands in Error without a startup call.
        let err = manager.set_enabled("screenshot.builtin", true).await.unwrap_err();
        assert!(matches!(err, HostError::Init { .. }));
        assert_eq!(manager.state("screenshot.builtin").await.unwrap(), PluginState::Error);
        assert_eq!(probe.startups.load(Ordering::SeqCst), 0);

        probe.fail_init.store(false, Ordering::SeqCst);
        manager.init("screenshot.builtin").await.unwrap();
        manager.init("screenshot.builtin").await.unwrap();
        assert_eq!(probe.inits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_plugin_id() {
        let manager = manager();
        let err = manager.set_enabled("nope", true).await.unwrap_err();
        assert!(matches!(err, HostError::UnknownPluginId(id) if id == "nope"));
        assert!(matches!(manager.init("nope").await, Err(HostError::UnknownPluginId(_))));
    }

    #[tokio::test]
    async fn test_disable_cancels_periodic_task_before_returning() {
        let manager = manager();
        let (plugin, probe) =
            MockPlugin::with("clock.builtin", Duration::ZERO, Some(Duration::from_millis(5)));
        manager.install(plugin).await.unwrap();
        let mut emissions = manager.bus().subscribe("plugin.clock.builtin");

        manager.set_enabled("clock.builtin", true).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), emissions.recv()).await.unwrap();
        assert!(first.is_some());

        manager.set_enabled("clock.builtin", false).await.unwrap();
        let ticks_at_disable = probe.ticks.load(Ordering::SeqCst);
        while emissions.try_recv().is_some() {}

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(emissions.try_recv().is_none());
        assert_eq!(probe.ticks.load(Ordering::SeqCst), ticks_at_disable);
    }

    #[tokio::test]
    async fn test_shutdown_all_disables_enabled_plugins() {
        let manager = manager();
        let (a, probe_a) = MockPlugin::new("a");
        let (b, probe_b) = MockPlugin::new("b");
        manager.install(a).await.unwrap();
        manager.install(b).await.unwrap();
        manager.set_enabled("a", true).await.unwrap();

        manager.shutdown_all().await;
        assert_eq!(manager.state("a").await.unwrap(), PluginState::Disabled);
        assert_eq!(manager.state("b").await.unwrap(), PluginState::Installed);
        assert_eq!(probe_a.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(probe_b.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_startup_sets_error() {
        struct Panicky {
            metadata: PluginMetadata,
        }

        #[async_trait]
        impl PluginCapability for Panicky {
            fn metadata(&self) -> &PluginMetadata {
                &self.metadata
            }

            async fn startup(&self, _ctx: &PluginContext) -> Result<()> {
                panic!("driver crashed");
            }

            async fn shutdown(&self) -> Result<()> {
                Ok(())
            }
        }

        let manager = manager();
        manager
            .install(Arc::new(Panicky { metadata: PluginMetadata::new("p", "P") }))
            .await
            .unwrap();

        let err = manager.set_enabled("p", true).await.unwrap_err();
        assert!(matches!(err, HostError::LifecycleHook { hook: HookName::Startup, .. }));
        assert_eq!(manager.state("p").await.unwrap(), PluginState::Error);
    }
}
