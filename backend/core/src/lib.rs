pub mod bus;
pub mod error;
pub mod event;
pub mod types;

pub use bus::{
    plugin_topic, BusPayload, EventBus, Subscription, SubscriptionHandle, LIFECYCLE_TOPIC,
};
pub use error::{HookName, HostError, HostResult};
pub use event::{LifecycleEvent, LifecycleEventKind};
pub use types::{
    plugin_path, NavItem, PluginFlags, PluginMetadata, PluginRecord, PluginRuntimeState,
    PluginSnapshot, PluginState, PluginType, ReservedAction, ShortcutBinding,
};
