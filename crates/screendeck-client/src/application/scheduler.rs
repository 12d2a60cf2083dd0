//! Cancellable delayed tasks.
//!
//! Every timer in the client (reconnect backoff, registration debounce,
//! hotkey tap release) goes through [`Scheduler::schedule`], which hands back
//! a [`TaskHandle`].  Cancelling the handle guarantees the task body never
//! starts, so a stale timer cannot race a newer one.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Spawns delayed tasks onto a Tokio runtime.
///
/// The scheduler captures the runtime handle at construction so tasks can be
/// scheduled from any thread, including OS callback threads that are not
/// themselves inside the runtime.
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    /// Creates a scheduler bound to the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Runs `task` once `delay` has elapsed, unless cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = Arc::clone(&state);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if task_state
                .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            task.await;
            task_state.store(DONE, Ordering::Release);
        });
        TaskHandle { join, state }
    }

    /// Spawns `task` immediately.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task)
    }
}

/// Handle to a task created by [`Scheduler::schedule`].
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    join: JoinHandle<()>,
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    /// Cancels the task if its delay has not elapsed yet.
    ///
    /// Returns `true` if the task was still pending.  A task that already
    /// started keeps running; use [`TaskHandle::abort`] to stop it.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.join.abort();
        }
        cancelled
    }

    /// Cancels a pending task or stops a running one at its next await point.
    ///
    /// Returns `true` if the task had not completed.
    pub fn abort(&self) -> bool {
        if self.cancel() {
            return true;
        }
        let running = self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if running {
            self.join.abort();
        }
        running
    }

    /// `true` while the delay is still counting down.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    /// `true` once the task body ran to completion.
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_runs_after_delay_not_before() {
        // Arrange
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));

        // Act
        let handle = scheduler.schedule(Duration::from_millis(800), counter_task(&counter));
        tokio::time::sleep(Duration::from_millis(799)).await;
        let before = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;

        // Assert
        assert_eq!(before, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.is_done());
        assert!(!handle.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        // Arrange
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule(Duration::from_secs(10), counter_task(&counter));

        // Act
        let cancelled = handle.cancel();
        tokio::time::sleep(Duration::from_secs(20)).await;

        // Assert
        assert!(cancelled);
        assert!(!handle.is_pending());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_completion_returns_false() {
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule(Duration::from_millis(10), counter_task(&counter));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!handle.cancel());
        assert!(!handle.abort());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_running_task() {
        // Arrange: the body sleeps after the delay, so it is running when aborted
        let scheduler = Scheduler::current();
        let counter = Arc::new(AtomicUsize::new(0));
        let body_counter = Arc::clone(&counter);
        let handle = scheduler.schedule(Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            body_counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let aborted = handle.abort();
        tokio::time::sleep(Duration::from_secs(10)).await;

        // Assert
        assert!(aborted);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
