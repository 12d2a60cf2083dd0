//! Protocol module containing message types, argument lists, and the line codec.

pub mod codec;
pub mod messages;
pub mod params;

pub use codec::{decode_line, decode_message, encode_message, frame_len, ProtocolError, MAX_LINE_LEN};
pub use messages::*;
