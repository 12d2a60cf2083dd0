//! Last-known visual state of a single key.
//!
//! The host draws a key either with a raw pixel buffer or with a set of
//! attributes (background colour, text, text colour, font size).  When a
//! bitmap is present it takes precedence for rendering; the attributes may
//! still be carried along but are ignored by [`KeyState::visual`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw RGB pixel buffer as delivered by the host.
///
/// Cloning is cheap: the bytes are reference counted so the same buffer can be
/// held by the cache, a hotkey thumbnail and any number of event consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap(Arc<[u8]>);

impl Bitmap {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Bitmap {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

/// Error returned when a colour string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid colour: {0:?}")]
pub struct ParseColorError(pub String);

/// A 24-bit RGB colour.
///
/// Parses `#rrggbb` (the host's hex colour mode) as well as `rgb(r,g,b)`,
/// and always formats as lowercase `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let trimmed = s.trim();

        if let Some(hex) = trimmed.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(err());
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
            return Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?));
        }

        if let Some(body) = trimmed
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let mut parts = body.split(',').map(|p| p.trim().parse::<u8>());
            let (Some(Ok(r)), Some(Ok(g)), Some(Ok(b)), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(err());
            };
            return Ok(Rgb::new(r, g, b));
        }

        Err(err())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Font size requested by the host for text-only keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    /// Fit the text to the key.
    Auto,
    Points(u32),
}

impl fmt::Display for FontSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontSize::Auto => f.write_str("auto"),
            FontSize::Points(pt) => write!(f, "{pt}"),
        }
    }
}

impl FromStr for FontSize {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(FontSize::Auto)
        } else {
            s.parse().map(FontSize::Points)
        }
    }
}

/// Default drag distance, in pixels, that produces one rotate step.
pub const DEFAULT_STEP_SIZE: u32 = 10;

/// Rotary-mode settings of a key.
///
/// Encoder keys emit rotate-left/right instead of press/release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderMode {
    pub is_encoder: bool,
    pub step_size: u32,
}

impl Default for EncoderMode {
    fn default() -> Self {
        Self {
            is_encoder: false,
            step_size: DEFAULT_STEP_SIZE,
        }
    }
}

/// Everything known about how a key should currently look.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    pub bitmap: Option<Bitmap>,
    pub color: Option<Rgb>,
    pub text: Option<String>,
    pub text_color: Option<Rgb>,
    pub font_size: Option<FontSize>,
    pub encoder: EncoderMode,
}

/// What a presentation layer should actually paint for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVisual<'a> {
    Bitmap(&'a Bitmap),
    Attributes {
        color: Option<Rgb>,
        text: Option<&'a str>,
        text_color: Option<Rgb>,
        font_size: Option<FontSize>,
    },
}

impl KeyState {
    /// Returns the bitmap if present, otherwise the attribute tuple.
    pub fn visual(&self) -> KeyVisual<'_> {
        match &self.bitmap {
            Some(bitmap) => KeyVisual::Bitmap(bitmap),
            None => KeyVisual::Attributes {
                color: self.color,
                text: self.text.as_deref(),
                text_color: self.text_color,
                font_size: self.font_size,
            },
        }
    }

    /// `true` if the state carries no visual information at all.
    pub fn is_blank(&self) -> bool {
        self.bitmap.is_none() && self.color.is_none() && self.text.is_none()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_parses_hex_and_functional_forms() {
        assert_eq!("#ff8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        assert_eq!("#FF8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        assert_eq!("rgb(1, 2, 3)".parse::<Rgb>().unwrap(), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_rgb_rejects_malformed_input() {
        assert!("ff8000".parse::<Rgb>().is_err());
        assert!("#ff80".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
        assert!("rgb(1,2)".parse::<Rgb>().is_err());
        assert!("rgb(1,2,3,4)".parse::<Rgb>().is_err());
        assert!("rgb(300,0,0)".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_rgb_displays_lowercase_hex() {
        assert_eq!(Rgb::new(0xAB, 0x01, 0xFF).to_string(), "#ab01ff");
    }

    #[test]
    fn test_font_size_parses_auto_and_points() {
        assert_eq!("auto".parse::<FontSize>().unwrap(), FontSize::Auto);
        assert_eq!("14".parse::<FontSize>().unwrap(), FontSize::Points(14));
        assert!("big".parse::<FontSize>().is_err());
    }

    #[test]
    fn test_bitmap_takes_precedence_over_attributes() {
        // Arrange
        let state = KeyState {
            bitmap: Some(Bitmap::from(vec![1, 2, 3])),
            color: Some(Rgb::new(255, 0, 0)),
            text: Some("REC".to_string()),
            ..Default::default()
        };

        // Act / Assert
        match state.visual() {
            KeyVisual::Bitmap(b) => assert_eq!(b.as_bytes(), &[1, 2, 3]),
            other => panic!("expected bitmap visual, got {other:?}"),
        }
    }

    #[test]
    fn test_attributes_used_without_bitmap() {
        let state = KeyState {
            color: Some(Rgb::new(0, 255, 0)),
            text: Some("GO".to_string()),
            ..Default::default()
        };

        assert_eq!(
            state.visual(),
            KeyVisual::Attributes {
                color: Some(Rgb::new(0, 255, 0)),
                text: Some("GO"),
                text_color: None,
                font_size: None,
            }
        );
        assert!(!state.is_blank());
        assert!(KeyState::default().is_blank());
    }

    #[test]
    fn test_encoder_mode_default_step_size_is_ten() {
        let mode = EncoderMode::default();
        assert!(!mode.is_encoder);
        assert_eq!(mode.step_size, 10);
    }
}
