//! Structured logging for DeskForge.
//!
//! Subscriber setup with optional rolling file output, a bus consumer that
//! records lifecycle events, and redaction of secrets in hook failure details.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{LifecycleEventLogger, LifecycleLogEntry};
pub use logger::{build_filter, init_logger};
pub use redact::redact_sensitive_data;
