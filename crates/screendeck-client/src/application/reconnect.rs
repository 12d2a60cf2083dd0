//! Connection state machine with fixed-delay retries.
//!
//! ```text
//!            start / reconfigure
//!   Disconnected ───────────────► (timer) ──► Connecting ──┬──► Connected
//!        ▲                                      ▲          │        │
//!        │ disconnect                           │ retry    ▼        │ socket closed
//!        │                                    (timer) ◄─ Failed      ▼
//!        │                                      ▲               Reconnecting
//!        │                                      └──────────────────┘
//! ```
//!
//! - Every failure, whatever its classification, waits `retry_delay` before
//!   the next attempt.  The supervisor never gives up on its own.
//! - At most one timer (or in-flight attempt) exists at any time.
//! - `disconnect` and `reconfigure` cancel that timer, abort any in-flight
//!   attempt, and restart from `Disconnected`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use screendeck_core::{ConnectError, ConnectionState};
use tracing::{debug, info, warn};

use super::events::{EventBus, Subscription};
use super::link::SatelliteLink;
use super::scheduler::{Scheduler, TaskHandle};
use super::settings::TimingConfig;

/// Delays used by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before the very first attempt after start-up.
    pub initial_delay: Duration,
    /// Wait after a failed attempt or a dropped session.
    pub retry_delay: Duration,
    /// Wait after the endpoint was changed.
    pub reconfigure_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for ReconnectPolicy {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            initial_delay: timing.initial_connect_delay(),
            retry_delay: timing.retry_delay(),
            reconfigure_delay: timing.reconfigure_delay(),
        }
    }
}

struct SupervisorState {
    state: ConnectionState,
    host: String,
    port: u16,
    timer: Option<TaskHandle>,
    last_error: Option<ConnectError>,
    /// Bumped by every manual transition; stale attempts compare against it.
    epoch: u64,
    shut_down: bool,
}

/// Drives a [`SatelliteLink`] towards the connected state.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct ReconnectSupervisor {
    link: Arc<dyn SatelliteLink>,
    scheduler: Scheduler,
    policy: ReconnectPolicy,
    inner: Arc<Mutex<SupervisorState>>,
    states: EventBus<ConnectionState>,
}

impl ReconnectSupervisor {
    pub fn new(
        link: Arc<dyn SatelliteLink>,
        scheduler: Scheduler,
        policy: ReconnectPolicy,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            link,
            scheduler,
            policy,
            inner: Arc::new(Mutex::new(SupervisorState {
                state: ConnectionState::Disconnected,
                host: host.into(),
                port,
                timer: None,
                last_error: None,
                epoch: 0,
                shut_down: false,
            })),
            states: EventBus::new(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SupervisorState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner().state
    }

    pub fn last_error(&self) -> Option<ConnectError> {
        self.inner().last_error.clone()
    }

    pub fn endpoint(&self) -> (String, u16) {
        let inner = self.inner();
        (inner.host.clone(), inner.port)
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// `true` while a retry timer is counting down.
    pub fn has_pending_timer(&self) -> bool {
        self.inner().timer.as_ref().is_some_and(TaskHandle::is_pending)
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> Subscription<ConnectionState> {
        self.states.subscribe()
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Schedules the first attempt after the initial delay.
    pub fn start(&self) {
        let epoch = {
            let inner = self.inner();
            if inner.shut_down || inner.state != ConnectionState::Disconnected {
                return;
            }
            inner.epoch
        };
        info!(delay_ms = self.policy.initial_delay.as_millis() as u64, "connecting to host shortly");
        self.schedule_attempt(epoch, self.policy.initial_delay);
    }

    /// Called when an established session closes.
    ///
    /// Moves `Connected` to `Reconnecting` and schedules one retry.  Ignored
    /// in any other state (a manual disconnect already moved us away).
    pub fn on_connection_lost(&self) {
        let epoch = {
            let mut inner = self.inner();
            if inner.shut_down || inner.state != ConnectionState::Connected {
                debug!(state = ?inner.state, "ignoring connection loss");
                return;
            }
            self.set_state(&mut inner, ConnectionState::Reconnecting);
            inner.epoch
        };
        warn!(
            delay_ms = self.policy.retry_delay.as_millis() as u64,
            "connection lost; will retry"
        );
        self.schedule_attempt(epoch, self.policy.retry_delay);
    }

    /// Stops retrying and closes the link.
    pub async fn disconnect(&self) {
        self.reset_to_idle();
        self.link.disconnect().await;
    }

    /// Switches to a new endpoint and reconnects after a short delay.
    pub async fn reconfigure(&self, host: impl Into<String>, port: u16) {
        let host = host.into();
        info!(%host, port, "host endpoint changed");
        let epoch = {
            let epoch = self.reset_to_idle();
            let mut inner = self.inner();
            inner.host = host;
            inner.port = port;
            epoch
        };
        self.link.disconnect().await;
        self.schedule_attempt(epoch, self.policy.reconfigure_delay);
    }

    /// Cancels everything for good.  Does not close the link.
    pub fn shutdown(&self) {
        self.reset_to_idle();
        self.inner().shut_down = true;
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn set_state(&self, inner: &mut SupervisorState, state: ConnectionState) {
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "connection state");
            inner.state = state;
            self.states.publish(state);
        }
    }

    /// Cancels the timer, aborts an in-flight attempt, returns the new epoch.
    fn reset_to_idle(&self) -> u64 {
        let mut inner = self.inner();
        inner.epoch += 1;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        self.set_state(&mut inner, ConnectionState::Disconnected);
        inner.epoch
    }

    fn schedule_attempt(&self, epoch: u64, delay: Duration) {
        let this = self.clone();
        let handle = self.scheduler.schedule(delay, async move {
            this.attempt(epoch).await;
        });
        let mut inner = self.inner();
        if inner.epoch != epoch || inner.shut_down {
            handle.cancel();
            return;
        }
        if let Some(previous) = inner.timer.replace(handle) {
            // The previous handle is either the attempt now rescheduling
            // itself (already running, so this is a no-op) or a stale timer.
            previous.cancel();
        }
    }

    async fn attempt(&self, epoch: u64) {
        let (host, port) = {
            let mut inner = self.inner();
            if inner.epoch != epoch || inner.shut_down {
                return;
            }
            self.set_state(&mut inner, ConnectionState::Connecting);
            (inner.host.clone(), inner.port)
        };

        debug!(%host, port, "connect attempt");
        let result = self.link.connect(&host, port).await;

        let mut inner = self.inner();
        if inner.epoch != epoch {
            return;
        }
        match result {
            Ok(()) if self.link.is_connected() => {
                inner.last_error = None;
                inner.timer = None;
                self.set_state(&mut inner, ConnectionState::Connected);
                info!(%host, port, "connected to host");
            }
            Ok(()) => {
                self.set_state(&mut inner, ConnectionState::Reconnecting);
                drop(inner);
                self.schedule_attempt(epoch, self.policy.retry_delay);
            }
            Err(error) => {
                warn!(
                    code = error.code(),
                    "{}",
                    error.user_message(self.policy.retry_delay)
                );
                inner.last_error = Some(error);
                self.set_state(&mut inner, ConnectionState::Failed);
                drop(inner);
                self.schedule_attempt(epoch, self.policy.retry_delay);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
