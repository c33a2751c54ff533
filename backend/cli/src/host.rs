//! Host facade: wires registry, lifecycle, navigation, shortcuts and page
//! hooks into one object the binary and the HTTP API share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use deskforge_config::HostConfig;
use deskforge_core::{
    plugin_topic, BusPayload, EventBus, HostResult, NavItem, PluginSnapshot, PluginState,
    ReservedAction, Subscription, LIFECYCLE_TOPIC,
};
use deskforge_hooks::{PageGuard, PageHookRegistry, TransitionTicket};
use deskforge_logging::LifecycleEventLogger;
use deskforge_plugins::builtin::SCREENSHOT_ID;
use deskforge_plugins::{LifecycleManager, PluginCapability, PluginRegistry};
use deskforge_routing::{
    ActionRunner, DispatchOutcome, NavigationSync, Navigator, PageRouter, ShortcutDispatcher,
};

/// Topic for host-level notifications such as utility window visibility.
pub const HOST_TOPIC: &str = "host";

// ---------------------------------------------------------------------------
// Reserved actions
// ---------------------------------------------------------------------------

/// Runs reserved shortcut actions by notifying bus subscribers.
pub struct HostActions {
    lifecycle: Arc<LifecycleManager>,
    utility_visible: AtomicBool,
}

impl HostActions {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            lifecycle,
            utility_visible: AtomicBool::new(false),
        }
    }

    pub fn utility_visible(&self) -> bool {
        self.utility_visible.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionRunner for HostActions {
    async fn run(&self, action: ReservedAction) -> Result<()> {
        let bus = self.lifecycle.bus();
        match action {
            ReservedAction::StartCapture => {
                let state = self.lifecycle.state(SCREENSHOT_ID).await?;
                if state != PluginState::Enabled {
                    bail!("{SCREENSHOT_ID} is {state}, capture unavailable");
                }
                bus.publish(
                    &plugin_topic(SCREENSHOT_ID),
                    BusPayload::Emission {
                        plugin_id: SCREENSHOT_ID.to_string(),
                        value: json!({ "action": "start_capture" }),
                    },
                );
            }
            ReservedAction::ToggleUtilityWindow => {
                // fetch_xor returns the previous value
                let visible = !self.utility_visible.fetch_xor(true, Ordering::SeqCst);
                bus.publish(
                    HOST_TOPIC,
                    BusPayload::Emission {
                        plugin_id: HOST_TOPIC.to_string(),
                        value: json!({ "utilityWindow": visible }),
                    },
                );
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct Host {
    lifecycle: Arc<LifecycleManager>,
    guard: Arc<PageGuard>,
    nav: Arc<NavigationSync>,
    router: Arc<PageRouter>,
    actions: Arc<HostActions>,
    dispatcher: ShortcutDispatcher,
    _event_logger: LifecycleEventLogger,
}

impl Host {
    /// Install `plugins`, wire the routing layer and enable the configured
    /// autostart plugins. Plugins that fail to install or start are logged
    /// and left out; the host still comes up.
    pub async fn start(config: &HostConfig, plugins: Vec<Arc<dyn PluginCapability>>) -> Self {
        let bus = Arc::new(EventBus::new());
        let event_logger = LifecycleEventLogger::attach(Arc::clone(&bus));
        let registry = Arc::new(PluginRegistry::new(Arc::clone(&bus)));
        let lifecycle = Arc::new(LifecycleManager::new(Arc::clone(&registry)));

        let hooks = PageHookRegistry::new();
        for plugin in plugins {
            let id = plugin.metadata().id.clone();
            if let Err(e) = lifecycle.install(Arc::clone(&plugin)).await {
                warn!(plugin = %id, error = %e, "Plugin not installed");
                continue;
            }
            for (phase, hook) in plugin.page_hooks() {
                hooks.register(&id, phase, hook).await;
            }
        }

        let guard = Arc::new(PageGuard::new(hooks, Arc::clone(&bus)));
        let nav = NavigationSync::start(Arc::clone(&registry)).await;
        let router = Arc::new(PageRouter::new(nav.subscribe(), Arc::clone(&guard)));
        let actions = Arc::new(HostActions::new(Arc::clone(&lifecycle)));

        let navigator: Arc<dyn Navigator> = Arc::clone(&router) as Arc<dyn Navigator>;
        let runner: Arc<dyn ActionRunner> = Arc::clone(&actions) as Arc<dyn ActionRunner>;
        let dispatcher = ShortcutDispatcher::new(navigator, runner)
            .with_reserved_table(config.reserved_actions.clone())
            .with_bindings(config.shortcuts.clone());

        let host = Self {
            lifecycle,
            guard,
            nav,
            router,
            actions,
            dispatcher,
            _event_logger: event_logger,
        };
        host.autostart(&config.autostart).await;
        host.nav.refresh().await;
        info!(
            "[Host] Ready with {} plugins, {} shortcut bindings",
            host.registry().len().await,
            host.dispatcher.binding_count()
        );
        host
    }

    async fn autostart(&self, ids: &[String]) {
        for id in ids {
            match self.lifecycle.set_enabled(id, true).await {
                Ok(state) => info!(plugin = %id, %state, "Autostarted"),
                Err(e) => warn!(plugin = %id, error = %e, "Autostart failed"),
            }
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.lifecycle.bus()
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        self.lifecycle.registry()
    }

    pub fn guard(&self) -> &Arc<PageGuard> {
        &self.guard
    }

    pub fn actions(&self) -> &Arc<HostActions> {
        &self.actions
    }

    pub async fn plugins(&self) -> Vec<PluginSnapshot> {
        self.registry().snapshot().await
    }

    pub fn nav_items(&self) -> Vec<NavItem> {
        self.nav.items()
    }

    pub fn current_path(&self) -> String {
        self.router.current_path()
    }

    pub fn subscribe_lifecycle(&self) -> Subscription {
        self.bus().subscribe(LIFECYCLE_TOPIC)
    }

    /// Enable or disable a plugin. The menu is recomputed before returning,
    /// whether the transition succeeded or left the plugin in Error.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> HostResult<PluginState> {
        let result = self.lifecycle.set_enabled(id, enabled).await;
        self.nav.refresh().await;
        result
    }

    pub async fn retry(&self, id: &str) -> HostResult<PluginState> {
        let result = self.lifecycle.retry(id).await;
        self.nav.refresh().await;
        result
    }

    pub async fn dispatch_shortcut(&self, plugin_id: &str) -> DispatchOutcome {
        self.dispatcher.handle(plugin_id).await
    }

    pub async fn dispatch_combo(&self, combo: &str) -> DispatchOutcome {
        self.dispatcher.handle_combo(combo).await
    }

    pub async fn notify_transition(
        &self,
        previous: Option<&str>,
        next: Option<&str>,
    ) -> TransitionTicket {
        self.guard.notify_transition(previous, next).await
    }

    /// Disable every running plugin.
    pub async fn shutdown(&self) {
        info!("[Host] Shutting down plugins");
        self.lifecycle.shutdown_all().await;
    }
}
