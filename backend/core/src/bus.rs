//! Topic event bus.
//!
//! Every subscriber owns an unbounded mpsc queue, so delivery to one
//! subscriber preserves publish order for its topic and a slow consumer
//! never blocks the publisher. Nothing is retained: a publish with no live
//! subscriber is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};
use std::task::{Context, Poll};

use futures::{FutureExt, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::HostError;
use crate::event::LifecycleEvent;

/// Topic carrying every [`LifecycleEvent`].
pub const LIFECYCLE_TOPIC: &str = "lifecycle";

/// Topic a plugin's own emissions are published on.
pub fn plugin_topic(plugin_id: &str) -> String {
    format!("plugin.{plugin_id}")
}

/// Messages carried by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusPayload {
    Lifecycle(LifecycleEvent),
    Emission {
        plugin_id: String,
        value: serde_json::Value,
    },
}

impl BusPayload {
    pub fn as_lifecycle(&self) -> Option<&LifecycleEvent> {
        match self {
            BusPayload::Lifecycle(event) => Some(event),
            BusPayload::Emission { .. } => None,
        }
    }
}

/// Identifies one subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub topic: String,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<BusPayload>,
}

/// A live subscription: a lazy, ordered stream of payloads for one topic.
///
/// Ends once the subscription is removed with [`EventBus::unsubscribe`] and
/// the queued messages are drained. Dropping it closes the queue; the dead
/// entry no longer counts as a subscriber and is pruned from the topic on the
/// next publish or subscribe.
pub struct Subscription {
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<BusPayload>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn topic(&self) -> &str {
        &self.handle.topic
    }

    /// Wait for the next payload. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<BusPayload> {
        self.rx.recv().await
    }

    /// Non-blocking receive; `None` when nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<BusPayload> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = BusPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Publish/subscribe router shared by the lifecycle manager, the
/// navigation synchronizer, background plugin tasks and the API layer.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every live subscriber of `topic`.
    /// Returns how many subscribers it reached.
    pub fn publish(&self, topic: &str, payload: BusPayload) -> usize {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(topic) else {
            debug!(topic, "No subscribers, message dropped");
            return 0;
        };

        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            if subscriber.tx.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        }
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        delivered
    }

    /// Convenience for the lifecycle topic.
    pub fn publish_lifecycle(&self, event: LifecycleEvent) -> usize {
        self.publish(LIFECYCLE_TOPIC, BusPayload::Lifecycle(event))
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let subscribers = topics.entry(topic.to_string()).or_default();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.push(Subscriber { id, tx });
        debug!(topic, subscription = %id, "Subscribed");
        Subscription {
            handle: SubscriptionHandle {
                id,
                topic: topic.to_string(),
            },
            rx,
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(&handle.topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != handle.id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            topics.remove(&handle.topic);
        }
        if removed {
            debug!(topic = %handle.topic, subscription = %handle.id, "Unsubscribed");
        }
        removed
    }

    /// Run `handler` on a bus-owned task for every message on `topic`.
    ///
    /// A handler that returns an error or panics is logged and skipped; the
    /// task keeps consuming and other subscribers are unaffected. Must be
    /// called from within a Tokio runtime.
    pub fn subscribe_with<F, Fut>(&self, topic: &str, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(BusPayload) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut subscription = self.subscribe(topic);
        let handle = subscription.handle();
        tokio::spawn(async move {
            while let Some(payload) = subscription.recv().await {
                let delivery = AssertUnwindSafe(async { handler(payload).await })
                    .catch_unwind()
                    .await;
                match delivery {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        let err = HostError::EventDelivery {
                            topic: subscription.topic().to_string(),
                            message: e.to_string(),
                        };
                        warn!(error = %err, "Subscriber handler failed");
                    }
                    Err(_) => {
                        let err = HostError::EventDelivery {
                            topic: subscription.topic().to_string(),
                            message: "handler panicked".to_string(),
                        };
                        error!(error = %err, "Subscriber handler panicked");
                    }
                }
            }
            debug!(topic = %subscription.topic(), "Handler subscription closed");
        });
        handle
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics
            .get(topic)
            .map(|subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LifecycleEventKind;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn emission(n: u64) -> BusPayload {
        BusPayload::Emission {
            plugin_id: "clock.builtin".into(),
            value: serde_json::json!(n),
        }
    }

    fn value_of(payload: BusPayload) -> u64 {
        match payload {
            BusPayload::Emission { value, .. } => value.as_u64().unwrap(),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("plugin.clock.builtin");
        for n in 0..50 {
            assert_eq!(bus.publish("plugin.clock.builtin", emission(n)), 1);
        }
        for n in 0..50 {
            assert_eq!(value_of(sub.recv().await.unwrap()), n);
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_drops_message() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("plugin.none", emission(1)), 0);

        // A later subscriber does not see earlier messages.
        let mut sub = bus.subscribe("plugin.none");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");
        bus.publish("a", emission(1));
        assert_eq!(value_of(a.recv().await.unwrap()), 1);
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_stream() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(LIFECYCLE_TOPIC);
        bus.publish_lifecycle(LifecycleEvent::new("x", LifecycleEventKind::Registered));

        assert!(bus.unsubscribe(&sub.handle()));
        assert!(!bus.unsubscribe(&sub.handle()));
        assert_eq!(bus.subscriber_count(LIFECYCLE_TOPIC), 0);

        // Queued message still drains, then the stream ends.
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t");
        drop(sub);
        assert_eq!(bus.subscriber_count("t"), 0);
        assert_eq!(bus.publish("t", emission(1)), 0);
        assert!(!bus.topics.read().unwrap().contains_key("t"));
    }

    #[tokio::test]
    async fn test_subscribe_prunes_dropped_entries() {
        let bus = EventBus::new();
        for _ in 0..3 {
            drop(bus.subscribe("t"));
        }
        let _live = bus.subscribe("t");
        assert_eq!(bus.topics.read().unwrap()["t"].len(), 1);
        assert_eq!(bus.subscriber_count("t"), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = Arc::clone(&seen);

        bus.subscribe_with("t", move |payload| {
            let seen = Arc::clone(&seen_in_handler);
            async move {
                let n = value_of(payload);
                if n == 0 {
                    anyhow::bail!("cannot handle zero");
                }
                if n == 1 {
                    panic!("handler blew up");
                }
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let mut other = bus.subscribe("t");

        for n in 0..4 {
            bus.publish("t", emission(n));
        }

        for n in 0..4 {
            let got = tokio::time::timeout(Duration::from_secs(1), other.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(value_of(got), n);
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = BusPayload::Lifecycle(LifecycleEvent::new(
            "calc.builtin",
            LifecycleEventKind::Enabled,
        ));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "lifecycle");
        assert_eq!(json["kind"], "enabled");
    }
}
