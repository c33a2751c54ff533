/// Page guard: runs plugin leave/enter hooks when the active page changes.
///
/// For a transition `(previous, next)` the guard issues `previous`'s leave
/// hook, then `next`'s enter hook. Each runs on its own task and neither is
/// awaited by the guard, so a slow leave hook does not delay the enter hook
/// or the navigation itself. Completion is reported on the outcome channel
/// and through the returned [`TransitionTicket`].
///
/// Plugins holding an exclusive resource (camera, capture handle) can see
/// their leave and enter hooks in flight at the same time when the user
/// navigates away and back quickly. Hosts that need strict exclusion can
/// await [`TransitionTicket::join`] before issuing the next transition.
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use deskforge_core::{EventBus, HostError, LifecycleEvent};

use crate::registry::{PageHook, PageHookRegistry};
use crate::types::{HookOutcome, IssuedHook, PagePayload, PagePhase};

const OUTCOME_BUFFER: usize = 64;

pub struct PageGuard {
    hooks: PageHookRegistry,
    bus: Arc<EventBus>,
    current: Mutex<Option<String>>,
    sequence: AtomicU64,
    outcome_tx: broadcast::Sender<HookOutcome>,
}

/// The hook calls issued for one transition.
///
/// Dropping the ticket detaches the hook tasks; they still run to completion.
#[derive(Default)]
pub struct TransitionTicket {
    issued: Vec<IssuedHook>,
    handles: Vec<JoinHandle<HookOutcome>>,
}

impl TransitionTicket {
    /// Issued calls, in issue order.
    pub fn issued(&self) -> &[IssuedHook] {
        &self.issued
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// Wait for every issued hook and collect the outcomes in issue order.
    pub async fn join(self) -> Vec<HookOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "Page hook task did not complete"),
            }
        }
        outcomes
    }
}

impl PageGuard {
    pub fn new(hooks: PageHookRegistry, bus: Arc<EventBus>) -> Self {
        let (outcome_tx, _) = broadcast::channel(OUTCOME_BUFFER);
        Self {
            hooks,
            bus,
            current: Mutex::new(None),
            sequence: AtomicU64::new(0),
            outcome_tx,
        }
    }

    pub fn hooks(&self) -> &PageHookRegistry {
        &self.hooks
    }

    /// Plugin whose page is currently shown, if any.
    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Completion reports for every hook issued from now on.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<HookOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Observe a navigation from `previous` to `next`.
    ///
    /// Never fails: hook errors are logged and reported as outcomes. The
    /// current page becomes `next` whatever the hooks do.
    pub async fn notify_transition(
        &self,
        previous: Option<&str>,
        next: Option<&str>,
    ) -> TransitionTicket {
        if previous == next {
            debug!(page = ?next, "Transition to the same page, nothing to do");
            return TransitionTicket::default();
        }

        let leave = match previous {
            Some(id) => self.hooks.get(id, PagePhase::Leave).await.map(|h| (id, h)),
            None => None,
        };
        let enter = match next {
            Some(id) => self.hooks.get(id, PagePhase::Enter).await.map(|h| (id, h)),
            None => None,
        };

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = next.map(String::from);

        let mut ticket = TransitionTicket::default();
        if let Some((id, hook)) = leave {
            self.issue(&mut ticket, id, PagePhase::Leave, hook, previous, next);
        }
        if let Some((id, hook)) = enter {
            self.issue(&mut ticket, id, PagePhase::Enter, hook, previous, next);
        }
        debug!(from = ?previous, to = ?next, issued = ticket.issued.len(), "Page transition");
        ticket
    }

    /// Transition from the current page to `next`.
    pub async fn navigate(&self, next: Option<&str>) -> TransitionTicket {
        let previous = self.current();
        self.notify_transition(previous.as_deref(), next).await
    }

    fn issue(
        &self,
        ticket: &mut TransitionTicket,
        plugin_id: &str,
        phase: PagePhase,
        hook: Arc<dyn PageHook>,
        from: Option<&str>,
        to: Option<&str>,
    ) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let payload = PagePayload {
            plugin_id: plugin_id.to_string(),
            phase,
            from: from.map(String::from),
            to: to.map(String::from),
        };
        let bus = Arc::clone(&self.bus);
        let outcome_tx = self.outcome_tx.clone();

        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(hook.run(&payload)).catch_unwind().await;
            let error = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("hook panicked".to_string()),
            };

            match &error {
                None => {
                    bus.publish_lifecycle(
                        LifecycleEvent::new(&payload.plugin_id, phase.handled_kind())
                            .with_detail(hook.name()),
                    );
                }
                Some(message) => {
                    let err = HostError::LifecycleHook {
                        plugin_id: payload.plugin_id.clone(),
                        hook: phase.hook_name(),
                        message: message.clone(),
                    };
                    warn!(error = %err, hook = hook.name(), "Page hook failed");
                }
            }

            let outcome = HookOutcome {
                plugin_id: payload.plugin_id,
                phase,
                sequence,
                error,
            };
            // Nobody listening is fine.
            let _ = outcome_tx.send(outcome.clone());
            outcome
        });

        ticket.issued.push(IssuedHook {
            plugin_id: plugin_id.to_string(),
            phase,
            sequence,
        });
        ticket.handles.push(handle);
    }
}
