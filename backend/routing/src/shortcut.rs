/// Shortcut dispatcher: turns a global input event into an action.
///
/// A handful of plugin ids are claimed by reserved actions (the utility
/// window toggle, screen capture). Every other id, including ids nobody has
/// registered, becomes a navigation attempt to that plugin's page.
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use deskforge_core::{plugin_path, ReservedAction, ShortcutBinding};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavOutcome {
    Routed,
    NoSuchPage,
}

/// Moves the UI to a path.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, path: &str) -> Result<NavOutcome>;
}

/// Runs a reserved action.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: ReservedAction) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Dispatch results
// ---------------------------------------------------------------------------

/// What a shortcut resolves to, before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutAction {
    Reserved(ReservedAction),
    Navigate { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    ActionRun { action: ReservedAction },
    ActionFailed { action: ReservedAction, error: String },
    Routed { path: String },
    NoSuchPage { path: String },
    NavigationFailed { path: String, error: String },
    Unbound { combo: String },
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct ShortcutDispatcher {
    /// Closed policy table: plugin id → reserved action.
    reserved: HashMap<String, ReservedAction>,
    /// Normalized combo → plugin id.
    bindings: HashMap<String, String>,
    navigator: Arc<dyn Navigator>,
    actions: Arc<dyn ActionRunner>,
}

impl ShortcutDispatcher {
    pub fn new(navigator: Arc<dyn Navigator>, actions: Arc<dyn ActionRunner>) -> Self {
        Self {
            reserved: HashMap::new(),
            bindings: HashMap::new(),
            navigator,
            actions,
        }
    }

    pub fn with_reserved(mut self, plugin_id: impl Into<String>, action: ReservedAction) -> Self {
        self.reserved.insert(plugin_id.into(), action);
        self
    }

    pub fn with_reserved_table<I>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (String, ReservedAction)>,
    {
        self.reserved.extend(table);
        self
    }

    /// Later bindings for the same combo win.
    pub fn with_bindings<I>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = ShortcutBinding>,
    {
        for binding in bindings {
            self.bindings
                .insert(normalize_combo(&binding.combo), binding.plugin_id);
        }
        self
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn resolve(&self, plugin_id: &str) -> ShortcutAction {
        let plugin_id = plugin_id.trim();
        match self.reserved.get(plugin_id) {
            Some(action) => ShortcutAction::Reserved(*action),
            None => ShortcutAction::Navigate {
                path: plugin_path(plugin_id),
            },
        }
    }

    /// Handle a shortcut addressed to `plugin_id`. Never fails; collaborator
    /// errors and panics are logged and reported in the outcome.
    pub async fn handle(&self, plugin_id: &str) -> DispatchOutcome {
        match self.resolve(plugin_id) {
            ShortcutAction::Reserved(action) => {
                let result = AssertUnwindSafe(self.actions.run(action)).catch_unwind().await;
                match flatten(result) {
                    Ok(()) => {
                        info!("[Shortcut] {} → {}", plugin_id, action);
                        DispatchOutcome::ActionRun { action }
                    }
                    Err(error) => {
                        warn!(plugin = plugin_id, %action, %error, "Reserved action failed");
                        DispatchOutcome::ActionFailed { action, error }
                    }
                }
            }
            ShortcutAction::Navigate { path } => {
                let result = AssertUnwindSafe(self.navigator.navigate(&path))
                    .catch_unwind()
                    .await;
                match flatten(result) {
                    Ok(NavOutcome::Routed) => {
                        info!("[Shortcut] {} → {}", plugin_id, path);
                        DispatchOutcome::Routed { path }
                    }
                    Ok(NavOutcome::NoSuchPage) => {
                        debug!(plugin = plugin_id, %path, "No page for shortcut target");
                        DispatchOutcome::NoSuchPage { path }
                    }
                    Err(error) => {
                        warn!(plugin = plugin_id, %path, %error, "Shortcut navigation failed");
                        DispatchOutcome::NavigationFailed { path, error }
                    }
                }
            }
        }
    }

    /// Look up a key combo in the bindings and dispatch it.
    pub async fn handle_combo(&self, combo: &str) -> DispatchOutcome {
        let normalized = normalize_combo(combo);
        match self.bindings.get(&normalized) {
            Some(plugin_id) => self.handle(plugin_id).await,
            None => {
                debug!(combo = %normalized, "Unbound shortcut ignored");
                DispatchOutcome::Unbound { combo: normalized }
            }
        }
    }
}

/// `"Ctrl + Shift+K"` and `"ctrl+shift+k"` name the same combo.
pub fn normalize_combo(combo: &str) -> String {
    combo
        .split('+')
        .map(|key| key.trim().to_lowercase())
        .filter(|key| !key.is_empty())
        .collect::<Vec<_>>()
        .join("+")
}

fn flatten<T>(result: std::thread::Result<Result<T>>) -> std::result::Result<T, String> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("handler panicked".to_string()),
    }
}
