//! # screendeck-core
//!
//! Shared library for ScreenDeck containing the Companion Satellite wire
//! codec and the domain types that describe virtual control surfaces.
//!
//! This crate has zero dependencies on sockets, timers, or OS APIs.
//!
//! # Architecture overview
//!
//! ScreenDeck emulates physical macro pads as on-screen panels.  Each panel
//! is registered with a remote *host* (Bitfocus Companion) as a satellite
//! device; the host then tells the client how every key should look and the
//! client reports presses back.
//!
//! - **`protocol`** – How commands travel over the network.  Every command is
//!   a single text line (`KEY-STATE DEVICEID=pad KEY=3 COLOR=#ff0000`) that is
//!   decoded into a typed [`SatelliteMessage`] and encoded back again.
//!
//! - **`domain`** – Pure data: device identity and capabilities, the
//!   row-major key coordinate system, cached key visuals, and the events and
//!   error taxonomy exposed to consumers of the client.

pub mod domain;
pub mod protocol;

pub use domain::device::{DeviceCapabilities, DeviceId, GridShape, PincodeMap};
pub use domain::events::{ConnectError, ConnectionState, DeckEvent};
pub use domain::key_state::{Bitmap, EncoderMode, FontSize, KeyState, Rgb};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::SatelliteMessage;
