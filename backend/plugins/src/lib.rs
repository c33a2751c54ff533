pub mod builtin;
pub mod lifecycle;
pub mod periodic;
pub mod registry;
pub mod sdk;

pub use builtin::builtin_plugins;
pub use lifecycle::LifecycleManager;
pub use periodic::PeriodicTask;
pub use registry::PluginRegistry;
pub use sdk::{PluginCapability, PluginContext};
