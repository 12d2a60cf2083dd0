//! Typed publish/subscribe channel.
//!
//! Each [`Subscription`] owns an unbounded queue, so a slow consumer never
//! blocks the publisher and every subscriber sees events in publish order.
//! Dropping a subscription (or calling [`Subscription::unsubscribe`]) detaches
//! it from the bus immediately.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

struct BusInner<E> {
    next_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<E>)>,
}

/// Broadcasts cloned events to every live subscriber.
pub struct EventBus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new subscriber that receives every event published from now on.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every subscriber and returns how many received it.
    pub fn publish(&self, event: E) -> usize {
        let mut inner = lock(&self.inner);
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

fn lock<E>(inner: &Mutex<BusInner<E>>) -> std::sync::MutexGuard<'_, BusInner<E>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Receiving end of an [`EventBus`].
pub struct Subscription<E> {
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
    bus: Weak<Mutex<BusInner<E>>>,
}

impl<E> Subscription<E> {
    /// Waits for the next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Returns the next already-published event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Drains every event that is already queued.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }

    /// Detaches from the bus.  Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut inner = lock(&bus);
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
