//! Protocol message type definitions for the Companion Satellite API.
//!
//! One enum, [`SatelliteMessage`], covers both directions.  The host sends
//! render commands (`KEY-STATE`, `KEYS-CLEAR`, `BRIGHTNESS`, `LOCKED-STATE`)
//! and acknowledgements; the client sends device registration and input.

use std::fmt;
use std::str::FromStr;

use crate::domain::device::{DeviceCapabilities, DeviceId};
use crate::domain::key_state::{Bitmap, FontSize, Rgb};

/// API version this client speaks.
pub const API_VERSION: &str = "1.7.0";

/// Only hosts with this API major version are accepted.
pub const SUPPORTED_API_MAJOR: u32 = 1;

/// Default TCP port of the satellite listener on the host.
pub const DEFAULT_PORT: u16 = 16622;

/// Default host address.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Product name announced for every ScreenDeck device.
pub const PRODUCT_NAME: &str = "ScreenDeck";

// ── Command names ─────────────────────────────────────────────────────────────

pub mod command {
    pub const BEGIN: &str = "BEGIN";
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
    pub const QUIT: &str = "QUIT";
    pub const ERROR: &str = "ERROR";
    pub const ADD_DEVICE: &str = "ADD-DEVICE";
    pub const REMOVE_DEVICE: &str = "REMOVE-DEVICE";
    pub const KEY_PRESS: &str = "KEY-PRESS";
    pub const KEY_ROTATE: &str = "KEY-ROTATE";
    pub const KEY_STATE: &str = "KEY-STATE";
    pub const KEYS_CLEAR: &str = "KEYS-CLEAR";
    pub const BRIGHTNESS: &str = "BRIGHTNESS";
    pub const LOCKED_STATE: &str = "LOCKED-STATE";
}

// ── Key addressing ────────────────────────────────────────────────────────────

/// How a key is addressed on the wire.
///
/// The host accepts either a row-major index (`KEY=13`) or a
/// `row/column` pair (`KEY=1/5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRef {
    Index(u32),
    Grid { row: u32, column: u32 },
}

impl KeyRef {
    /// Reference for the key at column `x`, row `y`.
    pub fn at(x: u32, y: u32) -> Self {
        KeyRef::Grid { row: y, column: x }
    }

    /// Resolves to a key index given the device's column count.
    ///
    /// Returns `None` when the column lies outside the grid or the index
    /// does not fit in a `u32`.
    pub fn to_index(self, columns: u32) -> Option<u32> {
        match self {
            KeyRef::Index(index) => Some(index),
            KeyRef::Grid { column, .. } if column >= columns => None,
            KeyRef::Grid { row, column } => row.checked_mul(columns)?.checked_add(column),
        }
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRef::Index(index) => write!(f, "{index}"),
            KeyRef::Grid { row, column } => write!(f, "{row}/{column}"),
        }
    }
}

impl FromStr for KeyRef {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((row, column)) => Ok(KeyRef::Grid {
                row: row.trim().parse()?,
                column: column.trim().parse()?,
            }),
            None => s.trim().parse().map(KeyRef::Index),
        }
    }
}

/// Rotation direction of an encoder key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateDirection {
    Left,
    Right,
}

impl RotateDirection {
    /// Wire value: `1` for right, `-1` for left.
    pub fn wire_value(self) -> i8 {
        match self {
            RotateDirection::Left => -1,
            RotateDirection::Right => 1,
        }
    }
}

// ── Message payloads ──────────────────────────────────────────────────────────

/// `ADD-DEVICE` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddDeviceMessage {
    pub device_id: DeviceId,
    pub product_name: String,
    pub capabilities: DeviceCapabilities,
}

/// `KEY-STATE` payload: how the host wants one key drawn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyStateMessage {
    pub device_id: DeviceId,
    pub key: KeyRef,
    /// Control type reported by the host, usually `BUTTON`.
    pub key_type: Option<String>,
    pub bitmap: Option<Bitmap>,
    pub color: Option<Rgb>,
    pub text: Option<String>,
    pub text_color: Option<Rgb>,
    pub font_size: Option<FontSize>,
    pub pressed: Option<bool>,
}

impl Default for KeyRef {
    fn default() -> Self {
        KeyRef::Index(0)
    }
}

/// `<COMMAND> OK|ERROR ...` acknowledgement from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckMessage {
    /// The command being acknowledged (e.g. `ADD-DEVICE`).
    pub command: String,
    pub ok: bool,
    pub device_id: Option<DeviceId>,
    pub message: Option<String>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All satellite protocol messages in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatelliteMessage {
    // Connection-level
    /// Handshake sent by the host right after the TCP connection opens.
    Begin {
        companion_version: String,
        api_version: String,
    },
    Ping(String),
    Pong(String),
    Quit,

    // Client → host
    AddDevice(AddDeviceMessage),
    RemoveDevice {
        device_id: DeviceId,
    },
    KeyPress {
        device_id: DeviceId,
        key: KeyRef,
        pressed: bool,
    },
    KeyRotate {
        device_id: DeviceId,
        key: KeyRef,
        direction: RotateDirection,
    },

    // Host → client
    KeyState(KeyStateMessage),
    KeysClear {
        device_id: DeviceId,
    },
    Brightness {
        device_id: DeviceId,
        percent: u8,
    },
    LockedState {
        device_id: DeviceId,
        locked: bool,
        character_count: Option<u32>,
    },
    Ack(AckMessage),
    Error {
        message: String,
    },
    /// A command this client does not understand; ignored by the reader.
    Unknown {
        command: String,
    },
}

impl SatelliteMessage {
    /// The wire command name of this message.
    pub fn command(&self) -> &str {
        match self {
            SatelliteMessage::Begin { .. } => command::BEGIN,
            SatelliteMessage::Ping(_) => command::PING,
            SatelliteMessage::Pong(_) => command::PONG,
            SatelliteMessage::Quit => command::QUIT,
            SatelliteMessage::AddDevice(_) => command::ADD_DEVICE,
            SatelliteMessage::RemoveDevice { .. } => command::REMOVE_DEVICE,
            SatelliteMessage::KeyPress { .. } => command::KEY_PRESS,
            SatelliteMessage::KeyRotate { .. } => command::KEY_ROTATE,
            SatelliteMessage::KeyState(_) => command::KEY_STATE,
            SatelliteMessage::KeysClear { .. } => command::KEYS_CLEAR,
            SatelliteMessage::Brightness { .. } => command::BRIGHTNESS,
            SatelliteMessage::LockedState { .. } => command::LOCKED_STATE,
            SatelliteMessage::Ack(ack) => &ack.command,
            SatelliteMessage::Error { .. } => command::ERROR,
            SatelliteMessage::Unknown { command } => command,
        }
    }
}

/// Major component of a `major.minor.patch` version string.
pub fn api_major(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
