/// Navigation synchronizer: keeps the menu in step with plugin state.
///
/// `compute` is a pure projection of a registry snapshot. `NavigationSync`
/// wraps it in a task that listens on the lifecycle topic and republishes the
/// menu on a `watch` channel whenever the set of visible plugins may change.
use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use deskforge_core::{
    plugin_path, EventBus, NavItem, PluginSnapshot, SubscriptionHandle, LIFECYCLE_TOPIC,
};
use deskforge_plugins::PluginRegistry;

pub const DEFAULT_ICON: &str = "puzzle";

// ---------------------------------------------------------------------------
// Icons
// ---------------------------------------------------------------------------

/// Known plugin ids and the icon the menu shows for them.
const ICON_TABLE: &[(&str, &str)] = &[
    ("calculator.builtin", "calculator"),
    ("bookmarks.builtin", "bookmark"),
    ("clock.builtin", "clock"),
    ("screenshot.builtin", "camera"),
    ("process.builtin", "cpu"),
    ("ip.builtin", "globe"),
    ("color-picker.builtin", "palette"),
];

/// Table entry first, then the plugin's own icon, then [`DEFAULT_ICON`].
pub fn resolve_icon(plugin_id: &str, declared: &str) -> String {
    if let Some((_, icon)) = ICON_TABLE.iter().find(|(id, _)| *id == plugin_id) {
        return (*icon).to_string();
    }
    if !declared.trim().is_empty() {
        return declared.to_string();
    }
    DEFAULT_ICON.to_string()
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Fixed entries shown ahead of any plugin page.
pub fn base_items() -> Vec<NavItem> {
    [
        ("home", "Home", "home", "/"),
        ("plugins", "Plugins", "grid", "/plugins"),
        ("settings", "Settings", "settings", "/settings"),
    ]
    .into_iter()
    .map(|(id, label, icon, path)| NavItem {
        id: id.to_string(),
        label: label.to_string(),
        icon: icon.to_string(),
        path: path.to_string(),
        plugin_id: None,
    })
    .collect()
}

/// Menu for a registry snapshot: base items, then every navigable plugin in
/// registry order.
pub fn compute(snapshot: &[PluginSnapshot]) -> Vec<NavItem> {
    let mut items = base_items();
    items.extend(
        snapshot
            .iter()
            .filter(|plugin| plugin.is_navigable())
            .map(|plugin| NavItem {
                id: plugin.id.clone(),
                label: plugin.name.clone(),
                icon: resolve_icon(&plugin.id, &plugin.icon),
                path: plugin_path(&plugin.id),
                plugin_id: Some(plugin.id.clone()),
            }),
    );
    items
}

// ---------------------------------------------------------------------------
// Sync task
// ---------------------------------------------------------------------------

pub struct NavigationSync {
    registry: Arc<PluginRegistry>,
    items_tx: watch::Sender<Vec<NavItem>>,
    /// Serializes snapshot-then-publish so an older snapshot never overwrites a newer one.
    refresh_lock: Mutex<()>,
    subscription: SubscriptionHandle,
}

impl NavigationSync {
    /// Subscribe to lifecycle events, publish the initial menu and spawn the
    /// recompute loop. The loop ends when the sync is dropped.
    pub async fn start(registry: Arc<PluginRegistry>) -> Arc<Self> {
        // Subscribe before the first snapshot so no event falls in between.
        let mut events = registry.bus().subscribe(LIFECYCLE_TOPIC);
        let initial = compute(&registry.snapshot().await);
        let (items_tx, _) = watch::channel(initial);

        let sync = Arc::new(Self {
            registry,
            items_tx,
            refresh_lock: Mutex::new(()),
            subscription: events.handle(),
        });
        let weak: Weak<Self> = Arc::downgrade(&sync);

        tokio::spawn(async move {
            while let Some(payload) = events.recv().await {
                let Some(event) = payload.as_lifecycle() else { continue };
                if !event.kind.affects_navigation() {
                    continue;
                }
                debug!(plugin = %event.plugin_id, kind = %event.kind, "Navigation refresh triggered");

                // One recompute per burst.
                while events.try_recv().is_some() {}

                let Some(sync) = weak.upgrade() else { break };
                sync.refresh().await;
            }
            debug!("[Nav] Sync loop exited");
        });

        info!("[Nav] Navigation sync started");
        sync
    }

    /// Recompute from a fresh snapshot and publish if the menu changed.
    pub async fn refresh(&self) -> Vec<NavItem> {
        let _serial = self.refresh_lock.lock().await;
        let items = compute(&self.registry.snapshot().await);
        let changed = self.items_tx.send_if_modified(|current| {
            if *current == items {
                false
            } else {
                *current = items.clone();
                true
            }
        });
        if changed {
            info!("[Nav] Menu now has {} items", items.len());
        }
        items
    }

    /// Receiver that always holds the latest menu.
    pub fn subscribe(&self) -> watch::Receiver<Vec<NavItem>> {
        self.items_tx.subscribe()
    }

    pub fn items(&self) -> Vec<NavItem> {
        self.items_tx.borrow().clone()
    }

    fn bus(&self) -> &Arc<EventBus> {
        self.registry.bus()
    }
}

impl Drop for NavigationSync {
    fn drop(&mut self) {
        self.bus().unsubscribe(&self.subscription);
    }
}
