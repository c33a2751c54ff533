use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle notification about one plugin. Published, consumed, discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub plugin_id: String,
    pub kind: LifecycleEventKind,
    #[serde(default)]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Categories of lifecycle notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    /// Plugin metadata entered the registry
    Registered,
    /// Startup succeeded, state is Enabled
    Enabled,
    /// Shutdown succeeded, state is Disabled
    Disabled,
    /// The page enter hook completed
    EnterHandled,
    /// The page leave hook completed
    LeaveHandled,
    /// A startup or shutdown hook failed, state is Error
    Error,
}

impl LifecycleEventKind {
    /// Kinds that change what the navigation menu should show.
    pub fn affects_navigation(self) -> bool {
        matches!(
            self,
            LifecycleEventKind::Registered
                | LifecycleEventKind::Enabled
                | LifecycleEventKind::Disabled
                | LifecycleEventKind::Error
        )
    }
}

impl LifecycleEvent {
    pub fn new(plugin_id: impl Into<String>, kind: LifecycleEventKind) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            kind,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = LifecycleEvent::new("clock.builtin", LifecycleEventKind::Enabled);
        assert_eq!(event.plugin_id, "clock.builtin");
        assert_eq!(event.kind, LifecycleEventKind::Enabled);
        assert!(event.detail.is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = LifecycleEvent::new("calc.builtin", LifecycleEventKind::Error)
            .with_detail("startup refused");
        let json = serde_json::to_string(&event).unwrap();
        let back: LifecycleEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, LifecycleEventKind::Error);
        assert_eq!(back.detail.as_deref(), Some("startup refused"));
        assert!(json.contains("\"pluginId\""));
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(LifecycleEventKind::EnterHandled.to_string(), "enter_handled");
        assert_eq!(LifecycleEventKind::Registered.to_string(), "registered");
    }

    #[test]
    fn test_navigation_relevant_kinds() {
        assert!(LifecycleEventKind::Enabled.affects_navigation());
        assert!(LifecycleEventKind::Registered.affects_navigation());
        assert!(!LifecycleEventKind::EnterHandled.affects_navigation());
        assert!(!LifecycleEventKind::LeaveHandled.affects_navigation());
    }
}
