/// Built-in page hook implementations.
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::registry::PageHook;
use crate::types::PagePayload;

// ---------------------------------------------------------------------------
// Logging hook: logs every page transition it is attached to
// ---------------------------------------------------------------------------

pub struct LoggingPageHook {
    pub prefix: String,
}

impl LoggingPageHook {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

#[async_trait]
impl PageHook for LoggingPageHook {
    fn name(&self) -> &str { "logging_page_hook" }

    async fn run(&self, payload: &PagePayload) -> Result<()> {
        info!(
            "[{}] {:?} {} (from={:?} to={:?})",
            self.prefix, payload.phase, payload.plugin_id, payload.from, payload.to
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Closure hook: adapts a plain function into a PageHook
// ---------------------------------------------------------------------------

pub struct FnPageHook<F> {
    name: String,
    func: F,
}

impl<F> FnPageHook<F>
where
    F: Fn(&PagePayload) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self { name: name.into(), func }
    }
}

#[async_trait]
impl<F> PageHook for FnPageHook<F>
where
    F: Fn(&PagePayload) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str { &self.name }

    async fn run(&self, payload: &PagePayload) -> Result<()> {
        (self.func)(payload)
    }
}
