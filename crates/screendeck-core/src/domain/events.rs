//! Events raised to consumers, the classified error taxonomy and connection states.

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::device::DeviceId;
use super::key_state::KeyState;

/// Lifecycle state of the connection to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and no attempt scheduled.
    #[default]
    Disconnected,
    /// A connect attempt (TCP + handshake) is in progress.
    Connecting,
    /// Handshake complete; devices may be registered.
    Connected,
    /// An established connection dropped; a retry is scheduled.
    Reconnecting,
    /// The last connect attempt failed; a retry is scheduled.
    Failed,
}

/// Classified transport error.
///
/// None of these are fatal: they feed the reconnect supervisor and are shown to
/// the user as a notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The host is unreachable or nothing listens on the port.
    #[error("connection refused by {host}:{port}")]
    ConnectionRefused { host: String, port: u16 },
    /// An established session was dropped.
    #[error("connection reset by host")]
    ConnectionReset,
    /// The handshake or the keepalive did not complete in time.
    #[error("connection timed out")]
    TimedOut,
    /// Anything else, passed through verbatim.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl ConnectError {
    /// Maps a transport I/O error onto the taxonomy.
    pub fn classify(err: &io::Error, host: &str, port: u16) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::ConnectionRefused {
                host: host.to_string(),
                port,
            },
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ConnectError::ConnectionReset,
            io::ErrorKind::TimedOut => ConnectError::TimedOut,
            _ => ConnectError::Unknown(err.to_string()),
        }
    }

    /// Short machine-readable code, in the style of the POSIX errno names.
    pub fn code(&self) -> &'static str {
        match self {
            ConnectError::ConnectionRefused { .. } => "ECONNREFUSED",
            ConnectError::ConnectionReset => "ECONNRESET",
            ConnectError::TimedOut => "ETIMEDOUT",
            ConnectError::Unknown(_) => "UNKNOWN",
        }
    }

    /// Notification text shown to the user.
    ///
    /// `retry_delay` is the supervisor's backoff, quoted in the message for
    /// errors that trigger an automatic reconnect.
    pub fn user_message(&self, retry_delay: Duration) -> String {
        let secs = retry_delay.as_secs();
        match self {
            ConnectError::ConnectionRefused { host, port } => format!(
                "Unable to connect to {host}:{port}. Please check the IP address and try again."
            ),
            ConnectError::ConnectionReset => format!(
                "Connection to Companion lost. Trying to reconnect in {secs} seconds..."
            ),
            ConnectError::TimedOut => format!(
                "Connection to Companion timed out. Trying to reconnect in {secs} seconds..."
            ),
            ConnectError::Unknown(detail) => format!("An unexpected error occurred: {detail}"),
        }
    }
}

/// Events published by the client to every interested consumer.
///
/// Each device-scoped event carries the [`DeviceId`] so a window can decide
/// whether the event concerns it.
#[derive(Debug, Clone, PartialEq)]
pub enum DeckEvent {
    Connected,
    Disconnected,
    /// The host wants `key_index` of `device_id` to look like `state`.
    Draw {
        device_id: DeviceId,
        key_index: u32,
        state: KeyState,
    },
    Brightness {
        device_id: DeviceId,
        percent: u8,
    },
    ClearDeck {
        device_id: DeviceId,
    },
    LockedState {
        device_id: DeviceId,
        locked: bool,
    },
    /// The host acknowledged an ADD-DEVICE.
    DeviceAdded {
        device_id: DeviceId,
    },
    /// The host refused an ADD-DEVICE.
    DeviceRejected {
        device_id: DeviceId,
        message: String,
    },
    /// A classified error plus the raw transport message.
    Error {
        error: ConnectError,
        detail: String,
    },
}

impl DeckEvent {
    /// The device this event is scoped to, if any.
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            DeckEvent::Draw { device_id, .. }
            | DeckEvent::Brightness { device_id, .. }
            | DeckEvent::ClearDeck { device_id }
            | DeckEvent::LockedState { device_id, .. }
            | DeckEvent::DeviceAdded { device_id }
            | DeckEvent::DeviceRejected { device_id, .. } => Some(device_id),
            DeckEvent::Connected | DeckEvent::Disconnected | DeckEvent::Error { .. } => None,
        }
    }

    /// `true` for host render commands, which must reach consumers strictly
    /// in arrival order.
    pub fn is_render(&self) -> bool {
        matches!(
            self,
            DeckEvent::Draw { .. }
                | DeckEvent::Brightness { .. }
                | DeckEvent::ClearDeck { .. }
                | DeckEvent::LockedState { .. }
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_maps_io_kinds_onto_taxonomy() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        let other = io::Error::new(io::ErrorKind::Other, "boom");

        assert_eq!(
            ConnectError::classify(&refused, "10.0.0.5", 16622),
            ConnectError::ConnectionRefused {
                host: "10.0.0.5".to_string(),
                port: 16622
            }
        );
        assert_eq!(ConnectError::classify(&reset, "h", 1), ConnectError::ConnectionReset);
        assert_eq!(ConnectError::classify(&eof, "h", 1), ConnectError::ConnectionReset);
        assert_eq!(ConnectError::classify(&timeout, "h", 1), ConnectError::TimedOut);
        assert_eq!(
            ConnectError::classify(&other, "h", 1),
            ConnectError::Unknown("boom".to_string())
        );
    }

    #[test]
    fn test_refused_message_names_host_and_port() {
        let err = ConnectError::ConnectionRefused {
            host: "192.168.1.20".to_string(),
            port: 16622,
        };

        let msg = err.user_message(Duration::from_secs(10));

        assert!(msg.contains("192.168.1.20:16622"), "got {msg}");
        assert_eq!(err.code(), "ECONNREFUSED");
    }

    #[test]
    fn test_reset_message_quotes_retry_delay() {
        let msg = ConnectError::ConnectionReset.user_message(Duration::from_secs(10));
        assert!(msg.contains("10 seconds"), "got {msg}");
    }

    #[test]
    fn test_device_scoped_events_expose_device_id() {
        let id = DeviceId::from("pad");
        let event = DeckEvent::Brightness {
            device_id: id.clone(),
            percent: 40,
        };

        assert_eq!(event.device_id(), Some(&id));
        assert!(event.is_render());
        assert_eq!(DeckEvent::Connected.device_id(), None);
        assert!(!DeckEvent::Connected.is_render());
    }
}
