//! Recording [`SatelliteLink`] for tests.
//!
//! `MockLink` never opens a socket.  Every frame the real client would have
//! written is pushed onto `sent` instead (and, like the real client, frames
//! sent while disconnected are dropped), so tests can assert exactly what the
//! host would have seen and in what order.
//!
//! Inbound traffic is simulated with [`MockLink::emit`] and
//! [`MockLink::drop_connection`].
//!
//! # Scripting connect results
//!
//! `connect` succeeds by default.  Queue failures with
//! [`MockLink::fail_next_connect`]; each queued error is consumed by one
//! attempt.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use screendeck_core::protocol::messages::{AddDeviceMessage, KeyRef, RotateDirection};
use screendeck_core::{ConnectError, DeckEvent, DeviceCapabilities, DeviceId, SatelliteMessage};

use crate::application::events::{EventBus, Subscription};
use crate::application::link::SatelliteLink;

#[derive(Default)]
pub struct MockLink {
    /// Frames that would have been written to the host.
    pub sent: Mutex<Vec<SatelliteMessage>>,
    /// Every `(host, port)` passed to `connect`.
    pub connect_calls: Mutex<Vec<(String, u16)>>,
    pub disconnect_calls: Mutex<usize>,
    connect_results: Mutex<VecDeque<ConnectError>>,
    connected: AtomicBool,
    bus: EventBus<DeckEvent>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the connection flag without publishing anything.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes the next `connect` fail with `error`.
    pub fn fail_next_connect(&self, error: ConnectError) {
        lock(&self.connect_results).push_back(error);
    }

    /// Publishes `event` as if it had arrived from the host.
    pub fn emit(&self, event: DeckEvent) {
        self.bus.publish(event);
    }

    /// Simulates the host closing the socket.
    pub fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.bus.publish(DeckEvent::Error {
                error: ConnectError::ConnectionReset,
                detail: "connection closed by host".to_string(),
            });
            self.bus.publish(DeckEvent::Disconnected);
        }
    }

    pub fn sent(&self) -> Vec<SatelliteMessage> {
        lock(&self.sent).clone()
    }

    pub fn take_sent(&self) -> Vec<SatelliteMessage> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.connect_calls).len()
    }

    /// Ids of every `ADD-DEVICE` sent so far, in order.
    pub fn added_device_ids(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter_map(|m| match m {
                SatelliteMessage::AddDevice(add) => Some(add.device_id.to_string()),
                _ => None,
            })
            .collect()
    }

    fn send(&self, msg: SatelliteMessage) {
        if self.is_connected() {
            lock(&self.sent).push(msg);
        }
    }
}

#[async_trait]
impl SatelliteLink for MockLink {
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        lock(&self.connect_calls).push((host.to_string(), port));
        let scripted = lock(&self.connect_results).pop_front();
        if let Some(error) = scripted {
            self.bus.publish(DeckEvent::Error {
                error: error.clone(),
                detail: error.to_string(),
            });
            return Err(error);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.bus.publish(DeckEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        *lock(&self.disconnect_calls) += 1;
        if self.connected.swap(false, Ordering::SeqCst) {
            lock(&self.sent).push(SatelliteMessage::Quit);
            self.bus.publish(DeckEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn add_device(&self, id: &DeviceId, name: &str, capabilities: &DeviceCapabilities) {
        self.send(SatelliteMessage::AddDevice(AddDeviceMessage {
            device_id: id.clone(),
            product_name: name.to_string(),
            capabilities: capabilities.clone(),
        }));
    }

    fn remove_device(&self, id: &DeviceId) {
        self.send(SatelliteMessage::RemoveDevice {
            device_id: id.clone(),
        });
    }

    fn key_down_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyPress {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            pressed: true,
        });
    }

    fn key_up_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyPress {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            pressed: false,
        });
    }

    fn rotate_left_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyRotate {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            direction: RotateDirection::Left,
        });
    }

    fn rotate_right_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyRotate {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            direction: RotateDirection::Right,
        });
    }

    fn subscribe(&self) -> Subscription<DeckEvent> {
        self.bus.subscribe()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_while_disconnected_is_dropped() {
        // Arrange
        let link = MockLink::new();

        // Act
        link.key_down_xy(&DeviceId::from("pad"), 1, 1);

        // Assert
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        // Arrange
        let link = MockLink::new();
        let mut events = link.subscribe();
        link.fail_next_connect(ConnectError::TimedOut);

        // Act
        let first = link.connect("10.0.0.1", 16622).await;
        let second = link.connect("10.0.0.1", 16622).await;

        // Assert
        assert_eq!(first, Err(ConnectError::TimedOut));
        assert!(second.is_ok());
        assert_eq!(link.connect_count(), 2);
        let seen = events.drain();
        assert!(matches!(seen[0], DeckEvent::Error { error: ConnectError::TimedOut, .. }));
        assert_eq!(seen[1], DeckEvent::Connected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let link = MockLink::new();
        let mut events = link.subscribe();
        tokio_test::block_on(link.connect("h", 1)).unwrap();
        events.drain();

        tokio_test::block_on(link.disconnect());
        tokio_test::block_on(link.disconnect());

        assert_eq!(events.drain(), vec![DeckEvent::Disconnected]);
        assert_eq!(*link.disconnect_calls.lock().unwrap(), 2);
    }
}
