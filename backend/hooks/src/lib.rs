pub mod builtin;
pub mod guard;
pub mod registry;
pub mod types;

pub use builtin::{FnPageHook, LoggingPageHook};
pub use guard::{PageGuard, TransitionTicket};
pub use registry::{PageHook, PageHookRegistry};
pub use types::{HookOutcome, IssuedHook, PagePayload, PagePhase};
