//! Synchronous publish/subscribe hub — the only channel between health
//! components.
//!
//! Dispatch runs on the publisher's thread, in subscription order. The
//! handler list is snapshotted before dispatch, so handlers may publish or
//! (un)subscribe without deadlocking. A panicking handler is logged and
//! skipped; its siblings still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, error};

use super::types::{BusEvent, Topic};
use crate::utils::{lock, panic_message};

/// Handler invoked for each matching event.
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Opaque identifier of one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    /// `None` subscribes to every topic.
    topic: Option<Topic>,
    handler: Handler,
}

type Registry = Mutex<Vec<Registration>>;

/// The message bus. Construct one per engine and share it behind `Arc`.
pub struct MessageBus {
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        MessageBus {
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe `handler` to one topic. The returned [`Subscription`] is the
    /// disposer; dropping it does not unsubscribe.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(Some(topic), Arc::new(handler))
    }

    /// Subscribe `handler` to every topic.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, topic: Option<Topic>, handler: Handler) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.registry).push(Registration { id, topic, handler });
        debug!(subscription = id.0, topic = ?topic.map(|t| t.as_str()), "bus subscription added");
        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        remove(&self.registry, Some(topic), id)
    }

    /// Publish an event to every handler subscribed to its topic.
    ///
    /// Returns how many handlers completed without panicking.
    pub fn publish(&self, event: impl Into<BusEvent>) -> usize {
        let event = event.into();
        let topic = event.topic();

        let handlers: Vec<(SubscriptionId, Handler)> = lock(&self.registry)
            .iter()
            .filter(|r| r.topic.map_or(true, |t| t == topic))
            .map(|r| (r.id, r.handler.clone()))
            .collect();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        topic = %topic,
                        subscription = id.0,
                        panic = %panic_message(payload.as_ref()),
                        "bus handler panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of handlers that would receive an event on `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        lock(&self.registry)
            .iter()
            .filter(|r| r.topic.map_or(true, |t| t == topic))
            .count()
    }
}

fn remove(registry: &Registry, topic: Option<Topic>, id: SubscriptionId) -> bool {
    let mut regs = lock(registry);
    let before = regs.len();
    regs.retain(|r| !(r.id == id && (topic.is_none() || r.topic == topic)));
    before != regs.len()
}

// ─────────────────────────────────────────────
// Subscription (disposer)
// ─────────────────────────────────────────────

/// Handle returned by [`MessageBus::subscribe`].
///
/// Holds only a weak reference, so it never keeps the bus alive.
pub struct Subscription {
    id: SubscriptionId,
    topic: Option<Topic>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler from the bus.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => remove(&registry, self.topic, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}
