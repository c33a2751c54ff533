use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a plugin comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    #[default]
    Builtin,
    External,
}

/// Immutable identity of a plugin, fixed at registration time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub icon: String,
    #[serde(rename = "type", default)]
    pub plugin_type: PluginType,
    /// Discovery keywords (search box, launcher).
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl PluginMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "0.1.0".to_string(),
            icon: String::new(),
            plugin_type: PluginType::Builtin,
            keywords: BTreeSet::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_type(mut self, plugin_type: PluginType) -> Self {
        self.plugin_type = plugin_type;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Lifecycle state of a plugin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    #[default]
    Installed,
    Enabled,
    Disabled,
    Error,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Installed => "installed",
            PluginState::Enabled => "enabled",
            PluginState::Disabled => "disabled",
            PluginState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Presentation flags a plugin declares at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginFlags {
    pub has_page: bool,
    pub show_in_menu: bool,
}

impl Default for PluginFlags {
    fn default() -> Self {
        Self {
            has_page: true,
            show_in_menu: true,
        }
    }
}

impl PluginFlags {
    /// Background-only plugin: no page, nothing in the menu.
    pub fn headless() -> Self {
        Self {
            has_page: false,
            show_in_menu: false,
        }
    }
}

/// Mutable part of a plugin record. Only the lifecycle manager writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginRuntimeState {
    pub state: PluginState,
    #[serde(flatten)]
    pub flags: PluginFlags,
    /// Detail of the last failed hook; cleared by the next successful transition.
    pub last_error: Option<String>,
}

/// Metadata plus runtime state, as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginRecord {
    pub metadata: PluginMetadata,
    pub runtime: PluginRuntimeState,
}

impl PluginRecord {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn snapshot(&self) -> PluginSnapshot {
        PluginSnapshot {
            id: self.metadata.id.clone(),
            name: self.metadata.name.clone(),
            icon: self.metadata.icon.clone(),
            state: self.runtime.state,
            has_page: self.runtime.flags.has_page,
            show_in_menu: self.runtime.flags.show_in_menu,
        }
    }
}

/// Read-only view handed to the UI and menu layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginSnapshot {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub state: PluginState,
    pub has_page: bool,
    pub show_in_menu: bool,
}

impl PluginSnapshot {
    /// True when the plugin should appear in the navigation menu.
    pub fn is_navigable(&self) -> bool {
        self.state == PluginState::Enabled && self.has_page && self.show_in_menu
    }
}

/// One entry of the derived navigation menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavItem {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
}

/// Static `combo -> plugin id` mapping loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutBinding {
    pub combo: String,
    pub plugin_id: String,
}

/// Dispatcher-owned actions that bypass navigation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReservedAction {
    /// Show or hide the singleton utility window.
    ToggleUtilityWindow,
    /// Begin a one-shot screen capture.
    StartCapture,
}

impl fmt::Display for ReservedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservedAction::ToggleUtilityWindow => "toggle_utility_window",
            ReservedAction::StartCapture => "start_capture",
        };
        f.write_str(s)
    }
}

/// Navigation path of a plugin page.
pub fn plugin_path(plugin_id: &str) -> String {
    format!("/plugins/{plugin_id}")
}
