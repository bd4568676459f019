//! # Event Bus
//!
//! Typed publish/subscribe used for connectivity changes and out-of-band
//! records.
//!
//! ## Delivery Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  publish(&event)                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  snapshot handlers (lock held only for the copy)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each handler, in subscription order:                              │
//! │       active? ──no──► skip                                             │
//! │         │                                                               │
//! │        yes ──► handler(&event)                                         │
//! │                                                                         │
//! │  A handler may subscribe or unsubscribe (itself or others) while       │
//! │  being called. A handler unsubscribed mid-delivery is not called       │
//! │  afterwards, even for the event currently being delivered.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping a [`Subscription`] leaves the handler registered; call
//! [`Subscription::unsubscribe`] to remove it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tally_core::Record;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Slot<E> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler<E>,
}

impl<E> Clone for Slot<E> {
    fn clone(&self) -> Self {
        Slot {
            id: self.id,
            active: self.active.clone(),
            handler: self.handler.clone(),
        }
    }
}

struct BusInner<E> {
    slots: Mutex<Vec<Slot<E>>>,
    next_id: AtomicU64,
}

impl<E> BusInner<E> {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot<E>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Multi-subscriber event channel. Clones share subscribers.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        EventBus {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        EventBus {
            inner: Arc::new(BusInner {
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<E> EventBus<E> {
    pub fn subscriber_count(&self) -> usize {
        self.inner.slots().len()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` and returns its token.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));

        self.inner.slots().push(Slot {
            id,
            active: active.clone(),
            handler: Arc::new(handler),
        });

        let weak: Weak<BusInner<E>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            active,
            remove: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.slots().retain(|slot| slot.id != id);
                }
            }),
        }
    }

    /// Delivers `event` to every active handler. Returns how many were called.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<Slot<E>> = self.inner.slots().clone();

        let mut delivered = 0;
        for slot in snapshot {
            if slot.active.load(Ordering::SeqCst) {
                (slot.handler)(event);
                delivered += 1;
            }
        }
        delivered
    }
}

/// Token returned by [`EventBus::subscribe`].
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Removes the handler. Takes effect immediately, including for an
    /// event currently being delivered.
    pub fn unsubscribe(self) {
        self.active.store(false, Ordering::SeqCst);
        (self.remove)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Records delivered out-of-band (push notifications).
pub type PushFeed = EventBus<Record>;
