/// Built-in plugins shipped with the host.
///
/// Their business logic is deliberately thin: they exist so the host has
/// something real to enable, route to and tick.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use tracing::info;

use deskforge_core::{PluginFlags, PluginMetadata};
use deskforge_hooks::{LoggingPageHook, PageHook, PagePhase};

use crate::sdk::{PluginCapability, PluginContext};

pub const CLOCK_ID: &str = "clock.builtin";
pub const CALCULATOR_ID: &str = "calculator.builtin";
pub const BOOKMARKS_ID: &str = "bookmarks.builtin";
pub const SCREENSHOT_ID: &str = "screenshot.builtin";

// ---------------------------------------------------------------------------
// Clock: background only, emits the current time every interval
// ---------------------------------------------------------------------------

pub struct ClockPlugin {
    metadata: PluginMetadata,
    interval: Duration,
    format: String,
}

impl ClockPlugin {
    pub fn new(interval: Duration) -> Self {
        Self {
            metadata: PluginMetadata::new(CLOCK_ID, "Clock")
                .with_icon("clock")
                .with_keywords(["time", "date", "clock"]),
            interval,
            format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

#[async_trait]
impl PluginCapability for ClockPlugin {
    fn metadata(&self) -> &PluginMetadata { &self.metadata }

    fn flags(&self) -> PluginFlags {
        PluginFlags { has_page: false, show_in_menu: true }
    }

    async fn startup(&self, ctx: &PluginContext) -> Result<()> {
        info!("[Clock] Started for {}", ctx.plugin_id());
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("[Clock] Stopped");
        Ok(())
    }

    fn periodic_interval(&self) -> Option<Duration> { Some(self.interval) }

    async fn tick(&self) -> Result<Option<serde_json::Value>> {
        let now = Local::now();
        Ok(Some(serde_json::json!({
            "time": now.format(&self.format).to_string(),
            "timestamp": now.timestamp(),
        })))
    }
}

// ---------------------------------------------------------------------------
// Page plugins: a page in the menu, logging enter/leave hooks
// ---------------------------------------------------------------------------

pub struct PagePlugin {
    metadata: PluginMetadata,
}

impl PagePlugin {
    pub fn calculator() -> Self {
        Self {
            metadata: PluginMetadata::new(CALCULATOR_ID, "Calculator")
                .with_icon("calculator")
                .with_keywords(["calc", "math", "arithmetic"]),
        }
    }

    pub fn bookmarks() -> Self {
        Self {
            metadata: PluginMetadata::new(BOOKMARKS_ID, "Bookmarks")
                .with_icon("bookmark")
                .with_keywords(["bookmark", "links", "favorites"]),
        }
    }
}

#[async_trait]
impl PluginCapability for PagePlugin {
    fn metadata(&self) -> &PluginMetadata { &self.metadata }

    async fn startup(&self, _ctx: &PluginContext) -> Result<()> {
        info!("[{}] Started", self.metadata.name);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("[{}] Stopped", self.metadata.name);
        Ok(())
    }

    fn page_hooks(&self) -> Vec<(PagePhase, Arc<dyn PageHook>)> {
        let hook: Arc<dyn PageHook> = Arc::new(LoggingPageHook::new(self.metadata.name.clone()));
        vec![(PagePhase::Enter, Arc::clone(&hook)), (PagePhase::Leave, hook)]
    }
}

// ---------------------------------------------------------------------------
// Screenshot: no page, driven by the capture shortcut; needs a display
// ---------------------------------------------------------------------------

pub struct ScreenshotPlugin {
    metadata: PluginMetadata,
    display_available: bool,
}

impl ScreenshotPlugin {
    pub fn new(display_available: bool) -> Self {
        Self {
            metadata: PluginMetadata::new(SCREENSHOT_ID, "Screenshot")
                .with_icon("camera")
                .with_keywords(["screenshot", "capture", "snip"]),
            display_available,
        }
    }

    /// Probe the session for a display server.
    pub fn detect() -> Self {
        let available = if cfg!(target_os = "linux") {
            std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
        } else {
            true
        };
        Self::new(available)
    }
}

#[async_trait]
impl PluginCapability for ScreenshotPlugin {
    fn metadata(&self) -> &PluginMetadata { &self.metadata }

    fn flags(&self) -> PluginFlags { PluginFlags::headless() }

    async fn init(&self) -> Result<()> {
        if !self.display_available {
            anyhow::bail!("no display server available for screen capture");
        }
        Ok(())
    }

    async fn startup(&self, _ctx: &PluginContext) -> Result<()> {
        info!("[Screenshot] Ready");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("[Screenshot] Released");
        Ok(())
    }
}

/// Every built-in plugin, in menu order.
pub fn builtin_plugins(clock_interval: Duration) -> Vec<Arc<dyn PluginCapability>> {
    vec![
        Arc::new(PagePlugin::calculator()),
        Arc::new(PagePlugin::bookmarks()),
        Arc::new(ClockPlugin::new(clock_interval)),
        Arc::new(ScreenshotPlugin::detect()),
    ]
}
