pub mod navigation;
pub mod router;
pub mod shortcut;

pub use navigation::{compute, NavigationSync};
pub use router::PageRouter;
pub use shortcut::{
    ActionRunner, DispatchOutcome, NavOutcome, Navigator, ShortcutAction, ShortcutDispatcher,
};
