use thiserror::Error;

/// Top-level error type for the DeskForge plugin core.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("plugin already registered: {0}")]
    DuplicateRegistration(String),

    #[error("unknown plugin id: {0}")]
    UnknownPluginId(String),

    #[error("plugin {plugin_id} failed to initialize: {message}")]
    Init { plugin_id: String, message: String },

    #[error("{hook} hook of plugin {plugin_id} failed: {message}")]
    LifecycleHook {
        plugin_id: String,
        hook: HookName,
        message: String,
    },

    #[error("delivery on topic {topic} failed: {message}")]
    EventDelivery { topic: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which plugin hook produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookName {
    Startup,
    Shutdown,
    Enter,
    Leave,
}

impl std::fmt::Display for HookName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HookName::Startup => "startup",
            HookName::Shutdown => "shutdown",
            HookName::Enter => "enter",
            HookName::Leave => "leave",
        };
        f.write_str(s)
    }
}

pub type HostResult<T> = Result<T, HostError>;
