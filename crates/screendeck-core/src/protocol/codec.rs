//! Line codec for encoding and decoding satellite protocol messages.
//!
//! Wire format:
//! ```text
//! COMMAND [WORD ...] [KEY=VALUE ...]\n
//! ```
//! One UTF-8 line per message.  A trailing `\r` before the newline is
//! tolerated.  Bitmaps and key text travel base64-encoded.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

use crate::domain::device::{DeviceCapabilities, DeviceId, PincodeMap};
use crate::domain::key_state::Bitmap;
use crate::protocol::messages::{
    command, AckMessage, AddDeviceMessage, KeyRef, KeyStateMessage, RotateDirection,
    SatelliteMessage,
};
use crate::protocol::params::{LineWriter, ParamList};

/// Upper bound on a single line, bitmaps included.
pub const MAX_LINE_LEN: usize = 4 * 1024 * 1024;

/// Bitmap size assumed when a peer announces `BITMAPS=true`.
const DEFAULT_BITMAP_SIZE: u32 = 72;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// No complete line is buffered yet.
    #[error("insufficient data: no line terminator in {available} bytes")]
    InsufficientData { available: usize },

    /// A line exceeded [`MAX_LINE_LEN`], terminated or not.
    #[error("line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,

    /// The line is empty, not UTF-8, or has an unterminated quote.
    #[error("malformed line: {0:?}")]
    MalformedLine(String),

    /// A parameter the command requires is absent.
    #[error("{command} is missing parameter {param}")]
    MissingParam { command: String, param: String },

    /// A parameter value could not be parsed.
    #[error("invalid value for {param}: {value:?}")]
    InvalidParam { param: String, value: String },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`SatelliteMessage`] into a newline-terminated line.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidParam`] if the message cannot be expressed
/// on the wire (an `ADD-DEVICE` with zero columns).
///
/// # Examples
///
/// ```rust
/// use screendeck_core::protocol::{encode_message, SatelliteMessage};
///
/// let bytes = encode_message(&SatelliteMessage::Ping("42".into())).unwrap();
/// assert_eq!(bytes, b"PING 42\n");
/// ```
pub fn encode_message(msg: &SatelliteMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut line = encode_line(msg)?;
    line.push('\n');
    Ok(line.into_bytes())
}

/// Decodes one [`SatelliteMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the number of bytes consumed (line plus
/// terminator), so the caller can advance their read cursor.  Blank lines
/// before the message are skipped and counted as consumed.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when no complete line is
/// buffered yet; any other error means the first line is unusable and can be
/// skipped with [`frame_len`].
///
/// # Examples
///
/// ```rust
/// use screendeck_core::protocol::{decode_message, SatelliteMessage};
///
/// let (msg, n) = decode_message(b"PONG 7\nKEYS-CLEAR").unwrap();
/// assert_eq!(msg, SatelliteMessage::Pong("7".into()));
/// assert_eq!(n, 7);
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<(SatelliteMessage, usize), ProtocolError> {
    let mut offset = 0;
    loop {
        let rest = &bytes[offset..];
        let Some(len) = frame_len(rest) else {
            if rest.len() > MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong);
            }
            return Err(ProtocolError::InsufficientData {
                available: rest.len(),
            });
        };

        if len - 1 > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong);
        }
        let raw = &rest[..len - 1];
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = std::str::from_utf8(raw)
            .map_err(|_| ProtocolError::MalformedLine(String::from_utf8_lossy(raw).into_owned()))?;

        if line.trim().is_empty() {
            offset += len;
            continue;
        }

        let msg = decode_line(line)?;
        return Ok((msg, offset + len));
    }
}

/// Length of the first line in `bytes` including its `\n`, if complete.
pub fn frame_len(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n').map(|i| i + 1)
}

/// Decodes a single line without its terminator.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the line is malformed or a parameter is
/// missing or invalid.
pub fn decode_line(line: &str) -> Result<SatelliteMessage, ProtocolError> {
    let p = ParamList::parse(line)?;

    // `<COMMAND> OK|ERROR ...` is an acknowledgement regardless of command.
    let carries_payload = matches!(
        p.command.as_str(),
        command::ERROR | command::PING | command::PONG
    );
    if !carries_payload {
        if let Some(status) = p.words.first().filter(|w| *w == "OK" || *w == "ERROR") {
            return Ok(SatelliteMessage::Ack(AckMessage {
                ok: status == "OK",
                device_id: p.get("DEVICEID").map(DeviceId::from),
                message: p.get("MESSAGE").map(str::to_string),
                command: p.command,
            }));
        }
    }

    match p.command.as_str() {
        command::BEGIN => Ok(SatelliteMessage::Begin {
            companion_version: p.get("CompanionVersion").unwrap_or_default().to_string(),
            api_version: p.require("ApiVersion")?.to_string(),
        }),
        command::PING => Ok(SatelliteMessage::Ping(p.words.join(" "))),
        command::PONG => Ok(SatelliteMessage::Pong(p.words.join(" "))),
        command::QUIT => Ok(SatelliteMessage::Quit),
        command::ERROR => Ok(SatelliteMessage::Error {
            message: p.get("MESSAGE").unwrap_or_default().to_string(),
        }),
        command::ADD_DEVICE => decode_add_device(&p).map(SatelliteMessage::AddDevice),
        command::REMOVE_DEVICE => Ok(SatelliteMessage::RemoveDevice {
            device_id: device_id(&p)?,
        }),
        command::KEY_PRESS => Ok(SatelliteMessage::KeyPress {
            device_id: device_id(&p)?,
            key: p.parse_required("KEY")?,
            pressed: p.flag("PRESSED")?.unwrap_or(false),
        }),
        command::KEY_ROTATE => {
            let raw = p.require("DIRECTION")?;
            let direction = match raw {
                "1" | "true" => RotateDirection::Right,
                "-1" | "0" | "false" => RotateDirection::Left,
                other => {
                    return Err(ProtocolError::InvalidParam {
                        param: "DIRECTION".to_string(),
                        value: other.to_string(),
                    })
                }
            };
            Ok(SatelliteMessage::KeyRotate {
                device_id: device_id(&p)?,
                key: p.parse_required("KEY")?,
                direction,
            })
        }
        command::KEY_STATE => decode_key_state(&p).map(SatelliteMessage::KeyState),
        command::KEYS_CLEAR => Ok(SatelliteMessage::KeysClear {
            device_id: device_id(&p)?,
        }),
        command::BRIGHTNESS => {
            let percent: u32 = p.parse_required("VALUE")?;
            Ok(SatelliteMessage::Brightness {
                device_id: device_id(&p)?,
                percent: percent.min(100) as u8,
            })
        }
        command::LOCKED_STATE => Ok(SatelliteMessage::LockedState {
            device_id: device_id(&p)?,
            locked: p.flag("LOCKED")?.unwrap_or(false),
            character_count: p.parse_opt("CHARACTER_COUNT")?,
        }),
        _ => {
            tracing::trace!(command = %p.command, "unrecognised satellite command");
            Ok(SatelliteMessage::Unknown { command: p.command })
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn encode_line(msg: &SatelliteMessage) -> Result<String, ProtocolError> {
    let line = match msg {
        SatelliteMessage::Begin {
            companion_version,
            api_version,
        } => LineWriter::new(command::BEGIN)
            .param("CompanionVersion", companion_version)
            .param("ApiVersion", api_version)
            .finish(),
        SatelliteMessage::Ping(payload) => with_payload(command::PING, payload),
        SatelliteMessage::Pong(payload) => with_payload(command::PONG, payload),
        SatelliteMessage::Quit => command::QUIT.to_string(),
        SatelliteMessage::AddDevice(m) => encode_add_device(m)?,
        SatelliteMessage::RemoveDevice { device_id } => LineWriter::new(command::REMOVE_DEVICE)
            .param("DEVICEID", device_id)
            .finish(),
        SatelliteMessage::KeyPress {
            device_id,
            key,
            pressed,
        } => LineWriter::new(command::KEY_PRESS)
            .param("DEVICEID", device_id)
            .param("KEY", key)
            .flag("PRESSED", *pressed)
            .finish(),
        SatelliteMessage::KeyRotate {
            device_id,
            key,
            direction,
        } => LineWriter::new(command::KEY_ROTATE)
            .param("DEVICEID", device_id)
            .param("KEY", key)
            .param("DIRECTION", direction.wire_value())
            .finish(),
        SatelliteMessage::KeyState(m) => encode_key_state(m),
        SatelliteMessage::KeysClear { device_id } => LineWriter::new(command::KEYS_CLEAR)
            .param("DEVICEID", device_id)
            .finish(),
        SatelliteMessage::Brightness { device_id, percent } => {
            LineWriter::new(command::BRIGHTNESS)
                .param("DEVICEID", device_id)
                .param("VALUE", percent)
                .finish()
        }
        SatelliteMessage::LockedState {
            device_id,
            locked,
            character_count,
        } => {
            let mut w = LineWriter::new(command::LOCKED_STATE)
                .param("DEVICEID", device_id)
                .flag("LOCKED", *locked);
            if let Some(count) = character_count {
                w = w.param("CHARACTER_COUNT", count);
            }
            w.finish()
        }
        SatelliteMessage::Ack(ack) => {
            let mut w = LineWriter::new(&ack.command).word(if ack.ok { "OK" } else { "ERROR" });
            if let Some(id) = &ack.device_id {
                w = w.param("DEVICEID", id);
            }
            if let Some(message) = &ack.message {
                w = w.param("MESSAGE", message);
            }
            w.finish()
        }
        SatelliteMessage::Error { message } => LineWriter::new(command::ERROR)
            .param("MESSAGE", message)
            .finish(),
        SatelliteMessage::Unknown { command } => command.clone(),
    };
    Ok(line)
}

fn with_payload(cmd: &str, payload: &str) -> String {
    if payload.is_empty() {
        cmd.to_string()
    } else {
        format!("{cmd} {payload}")
    }
}

fn encode_add_device(m: &AddDeviceMessage) -> Result<String, ProtocolError> {
    let caps = &m.capabilities;
    if caps.column_count == 0 {
        return Err(ProtocolError::InvalidParam {
            param: "KEYS_PER_ROW".to_string(),
            value: "0".to_string(),
        });
    }

    let mut w = LineWriter::new(command::ADD_DEVICE)
        .param("DEVICEID", &m.device_id)
        .param("PRODUCT_NAME", &m.product_name)
        .param("KEYS_TOTAL", caps.shape().key_count())
        .param("KEYS_PER_ROW", caps.column_count)
        .param("BITMAPS", caps.bitmap_size.unwrap_or(0))
        .param("COLORS", if caps.supports_color { "hex" } else { "false" })
        .flag("TEXT", caps.supports_text)
        .flag("TEXT_STYLE", caps.supports_text)
        .flag("BRIGHTNESS", caps.supports_brightness);
    if let Some(PincodeMap::Custom) = caps.pincode_map {
        w = w.param("PINCODE_MAP", "custom");
    }
    Ok(w.finish())
}

fn encode_key_state(m: &KeyStateMessage) -> String {
    let mut w = LineWriter::new(command::KEY_STATE)
        .param("DEVICEID", &m.device_id)
        .param("KEY", m.key);
    if let Some(key_type) = &m.key_type {
        w = w.param("TYPE", key_type);
    }
    if let Some(bitmap) = &m.bitmap {
        w = w.param("BITMAP", BASE64.encode(bitmap.as_bytes()));
    }
    if let Some(color) = m.color {
        w = w.param("COLOR", color);
    }
    if let Some(text) = &m.text {
        w = w.param("TEXT", BASE64.encode(text.as_bytes()));
    }
    if let Some(color) = m.text_color {
        w = w.param("TEXT_COLOR", color);
    }
    if let Some(size) = m.font_size {
        w = w.param("FONT_SIZE", size);
    }
    if let Some(pressed) = m.pressed {
        w = w.flag("PRESSED", pressed);
    }
    w.finish()
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn device_id(p: &ParamList) -> Result<DeviceId, ProtocolError> {
    p.require("DEVICEID").map(DeviceId::from)
}

fn decode_add_device(p: &ParamList) -> Result<AddDeviceMessage, ProtocolError> {
    let keys_total: u32 = p.parse_required("KEYS_TOTAL")?;
    let keys_per_row: u32 = p.parse_required("KEYS_PER_ROW")?;
    if keys_per_row == 0 {
        return Err(ProtocolError::InvalidParam {
            param: "KEYS_PER_ROW".to_string(),
            value: "0".to_string(),
        });
    }

    let bitmap_size = match p.get("BITMAPS") {
        None | Some("0") | Some("false") => None,
        Some("true") => Some(DEFAULT_BITMAP_SIZE),
        Some(_) => Some(p.parse_required::<u32>("BITMAPS")?),
    };
    let supports_color = !matches!(p.get("COLORS"), None | Some("false") | Some("0"));
    let pincode_map = match p.get("PINCODE_MAP") {
        Some("custom") => Some(PincodeMap::Custom),
        _ => None,
    };

    Ok(AddDeviceMessage {
        device_id: device_id(p)?,
        product_name: p.get("PRODUCT_NAME").unwrap_or_default().to_string(),
        capabilities: DeviceCapabilities {
            row_count: keys_total.div_ceil(keys_per_row),
            column_count: keys_per_row,
            bitmap_size,
            supports_color,
            supports_text: p.flag("TEXT")?.unwrap_or(false),
            supports_brightness: p.flag("BRIGHTNESS")?.unwrap_or(false),
            pincode_map,
        },
    })
}

fn decode_key_state(p: &ParamList) -> Result<KeyStateMessage, ProtocolError> {
    let bitmap = p
        .get("BITMAP")
        .filter(|raw| !raw.is_empty())
        .map(|raw| decode_base64("BITMAP", raw).map(Bitmap::from))
        .transpose()?;

    let text = p
        .get("TEXT")
        .map(|raw| {
            let bytes = decode_base64("TEXT", raw)?;
            String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidParam {
                param: "TEXT".to_string(),
                value: raw.to_string(),
            })
        })
        .transpose()?;

    Ok(KeyStateMessage {
        device_id: device_id(p)?,
        key: p.parse_required("KEY")?,
        key_type: p.get("TYPE").map(str::to_string),
        bitmap,
        color: p.parse_opt("COLOR")?,
        text,
        text_color: p.parse_opt("TEXT_COLOR")?,
        font_size: p.parse_opt("FONT_SIZE")?,
        pressed: p.flag("PRESSED")?,
    })
}

fn decode_base64(param: &str, raw: &str) -> Result<Vec<u8>, ProtocolError> {
    BASE64
        .decode(raw)
        .map_err(|_| ProtocolError::InvalidParam {
            param: param.to_string(),
            value: raw.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
