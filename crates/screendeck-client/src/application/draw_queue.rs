//! Strict FIFO delivery of host render commands.
//!
//! # How the queue works
//!
//! Render events (draw, brightness, clear, locked state) are appended to a
//! [`PendingDrawQueue`].  The event at the head stays in the queue while it
//! is being handled; it is popped only once its handler has finished.  So:
//!
//! - `push` onto an empty queue means nobody is draining: start a drain task.
//! - `push` onto a non-empty queue means a drain task is already running and
//!   will reach the new event after everything ahead of it.
//!
//! There is therefore at most one drain task per queue, and a slow handler for
//! event N delays event N+1 instead of letting it overtake.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use screendeck_core::DeckEvent;
use tracing::trace;

use super::scheduler::Scheduler;

/// Consumer of render events, awaited one event at a time.
#[async_trait]
pub trait DrawHandler: Send + Sync {
    async fn handle(&self, event: DeckEvent);
}

#[derive(Default)]
pub struct PendingDrawQueue {
    items: Mutex<VecDeque<DeckEvent>>,
}

impl PendingDrawQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<DeckEvent>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `event`; returns `true` if the queue was empty before.
    pub fn push(&self, event: DeckEvent) -> bool {
        let mut items = self.items();
        items.push_back(event);
        items.len() == 1
    }

    /// The event currently being dispatched.
    pub fn front(&self) -> Option<DeckEvent> {
        self.items().front().cloned()
    }

    /// Removes the head; returns `true` if more events are waiting.
    pub fn pop_front(&self) -> bool {
        let mut items = self.items();
        items.pop_front();
        !items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// Feeds a [`PendingDrawQueue`] through a [`DrawHandler`].
pub struct DrawPipeline {
    queue: Arc<PendingDrawQueue>,
    handler: Arc<dyn DrawHandler>,
    scheduler: Scheduler,
}

impl DrawPipeline {
    pub fn new(handler: Arc<dyn DrawHandler>, scheduler: Scheduler) -> Self {
        Self {
            queue: Arc::new(PendingDrawQueue::new()),
            handler,
            scheduler,
        }
    }

    /// Enqueues `event`, starting a drain task if none is running.
    pub fn submit(&self, event: DeckEvent) {
        if !self.queue.push(event) {
            trace!(pending = self.queue.len(), "render event queued behind in-flight event");
            return;
        }
        let queue = Arc::clone(&self.queue);
        let handler = Arc::clone(&self.handler);
        self.scheduler.spawn(async move {
            while let Some(event) = queue.front() {
                handler.handle(event).await;
                if !queue.pop_front() {
                    break;
                }
            }
        });
    }

    /// Events queued or in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
