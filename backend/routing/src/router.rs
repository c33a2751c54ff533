/// In-process page router.
///
/// Resolves paths against the latest navigation menu and tells the page guard
/// about every page change.
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use deskforge_core::NavItem;
use deskforge_hooks::{PageGuard, TransitionTicket};

use crate::shortcut::{NavOutcome, Navigator};

pub struct PageRouter {
    nav: watch::Receiver<Vec<NavItem>>,
    guard: Arc<PageGuard>,
    current_path: Mutex<String>,
}

impl PageRouter {
    pub fn new(nav: watch::Receiver<Vec<NavItem>>, guard: Arc<PageGuard>) -> Self {
        Self {
            nav,
            guard,
            current_path: Mutex::new("/".to_string()),
        }
    }

    pub fn current_path(&self) -> String {
        self.current_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn guard(&self) -> &Arc<PageGuard> {
        &self.guard
    }

    /// Route to `path`. `None` when the menu has no such entry.
    pub async fn route(&self, path: &str) -> Option<TransitionTicket> {
        let item = self
            .nav
            .borrow()
            .iter()
            .find(|item| item.path == path)
            .cloned()?;

        let ticket = self.guard.navigate(item.plugin_id.as_deref()).await;
        *self
            .current_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = item.path.clone();
        info!("[Router] Now showing {}", item.path);
        Some(ticket)
    }
}

#[async_trait]
impl Navigator for PageRouter {
    async fn navigate(&self, path: &str) -> Result<NavOutcome> {
        match self.route(path).await {
            Some(ticket) => {
                debug!(%path, hooks = ticket.issued().len(), "Route issued page hooks");
                Ok(NavOutcome::Routed)
            }
            None => Ok(NavOutcome::NoSuchPage),
        }
    }
}
