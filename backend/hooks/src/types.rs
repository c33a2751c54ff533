/// Page hook phases and the data carried into and out of each hook.
use serde::{Deserialize, Serialize};

use deskforge_core::{HookName, LifecycleEventKind};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// The side of a page transition a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePhase {
    /// The plugin's page is being navigated away from.
    Leave,
    /// The plugin's page is being navigated to.
    Enter,
}

impl PagePhase {
    pub fn hook_name(self) -> HookName {
        match self {
            PagePhase::Leave => HookName::Leave,
            PagePhase::Enter => HookName::Enter,
        }
    }

    /// Lifecycle event published once the hook succeeds.
    pub fn handled_kind(self) -> LifecycleEventKind {
        match self {
            PagePhase::Leave => LifecycleEventKind::LeaveHandled,
            PagePhase::Enter => LifecycleEventKind::EnterHandled,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Passed to a page hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload {
    /// Plugin whose hook is running.
    pub plugin_id: String,
    pub phase: PagePhase,
    /// Page the user is leaving (`None` for the host's own pages).
    pub from: Option<String>,
    /// Page the user is entering.
    pub to: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Completion report for one issued hook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutcome {
    pub plugin_id: String,
    pub phase: PagePhase,
    /// Issue order across all transitions observed by the guard.
    pub sequence: u64,
    /// `None` on success.
    pub error: Option<String>,
}

impl HookOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A hook call the guard has issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedHook {
    pub plugin_id: String,
    pub phase: PagePhase,
    pub sequence: u64,
}
