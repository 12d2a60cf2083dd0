//! The seam between the use cases and the connection to the host.
//!
//! [`SatelliteLink`] is implemented by
//! [`ProtocolClient`](crate::infrastructure::network::ProtocolClient) in
//! production and by
//! [`MockLink`](crate::infrastructure::network::mock::MockLink) in tests.
//!
//! Input commands are fire-and-forget: while no session is up they are
//! dropped, never queued.

use async_trait::async_trait;
use screendeck_core::{ConnectError, DeckEvent, DeviceCapabilities, DeviceId};

use super::events::Subscription;

/// A connection to a satellite host.
#[async_trait]
pub trait SatelliteLink: Send + Sync {
    /// Opens the transport and completes the handshake.
    ///
    /// On failure an [`DeckEvent::Error`] is also published to subscribers.
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError>;

    /// Tears the session down and publishes [`DeckEvent::Disconnected`] if
    /// one was open.  Calling it again is a no-op.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Sends a registration for `id`.  Dropped if not connected.
    fn add_device(&self, id: &DeviceId, name: &str, capabilities: &DeviceCapabilities);

    /// Sends a deregistration for `id`.  Unknown ids are ignored.
    fn remove_device(&self, id: &DeviceId);

    fn key_down_xy(&self, id: &DeviceId, x: u32, y: u32);
    fn key_up_xy(&self, id: &DeviceId, x: u32, y: u32);
    fn rotate_left_xy(&self, id: &DeviceId, x: u32, y: u32);
    fn rotate_right_xy(&self, id: &DeviceId, x: u32, y: u32);

    /// Subscribes to connection and render events.
    fn subscribe(&self) -> Subscription<DeckEvent>;
}
