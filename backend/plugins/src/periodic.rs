//! Periodic plugin tasks.
//!
//! A plugin that declares a tick interval gets one background task per
//! Enabled period. The lifecycle manager owns the task and stops it before
//! the plugin's shutdown hook runs; `stop` returns only once the task has
//! exited, so nothing is emitted after the plugin is disabled.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::sdk::{PluginCapability, PluginContext};

pub struct PeriodicTask {
    plugin_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the tick loop. Must be called from within a Tokio runtime.
    pub fn spawn(
        capability: Arc<dyn PluginCapability>,
        ctx: PluginContext,
        interval: Duration,
    ) -> Self {
        let plugin_id = ctx.plugin_id().to_string();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = AssertUnwindSafe(capability.tick()).catch_unwind() => result,
                };

                match result {
                    Ok(Ok(Some(value))) => {
                        if token.is_cancelled() {
                            break;
                        }
                        ctx.emit(value);
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => {
                        warn!(plugin = %ctx.plugin_id(), error = %e, "Periodic tick failed");
                    }
                    Err(_) => {
                        error!(plugin = %ctx.plugin_id(), "Periodic tick panicked");
                    }
                }
            }
            debug!(plugin = %ctx.plugin_id(), "Periodic task exited");
        });

        debug!(plugin = %plugin_id, interval_ms = interval.as_millis() as u64, "Periodic task started");
        Self { plugin_id, cancel, handle }
    }

    /// Cancel the task and wait until it has exited.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(plugin = %self.plugin_id, error = %e, "Periodic task ended abnormally");
        }
    }
}
