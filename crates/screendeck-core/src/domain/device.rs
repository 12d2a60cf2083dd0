//! Device identity, capability descriptors and the key coordinate system.
//!
//! # Coordinates
//!
//! A device is a grid of `columns × rows` keys.  Keys are addressed either by
//! an `(x, y)` pair (column, row) or by a zero-based, row-major *key index*:
//!
//! ```text
//! key_index = y * columns + x
//! x         = key_index % columns
//! y         = key_index / columns
//! ```
//!
//! [`GridShape`] is the only place that performs this conversion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a virtual control surface.
///
/// The host uses this string as the device serial, so it must stay stable
/// across restarts; it is persisted in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wraps `id` without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The `columns × rows` key grid of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub columns: u32,
    pub rows: u32,
}

impl GridShape {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Total number of keys on the device.
    pub fn key_count(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }

    /// Converts `(x, y)` to a key index, or `None` if the coordinate lies
    /// outside the grid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use screendeck_core::GridShape;
    ///
    /// let grid = GridShape::new(8, 4);
    /// assert_eq!(grid.index_of(5, 1), Some(13));
    /// assert_eq!(grid.index_of(8, 0), None);
    /// ```
    pub fn index_of(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.columns || y >= self.rows {
            return None;
        }
        Some(y * self.columns + x)
    }

    /// Converts a key index to `(x, y)`, or `None` if it lies outside the grid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use screendeck_core::GridShape;
    ///
    /// let grid = GridShape::new(8, 4);
    /// assert_eq!(grid.coords_of(13), Some((5, 1)));
    /// ```
    pub fn coords_of(&self, key_index: u32) -> Option<(u32, u32)> {
        if self.columns == 0 || key_index >= self.key_count() {
            return None;
        }
        Some((key_index % self.columns, key_index / self.columns))
    }
}

/// How the host should map a pincode entry onto the keys of a locked device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PincodeMap {
    /// The host draws its own pincode layout.
    Custom,
}

/// Capability descriptor sent to the host when registering a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub row_count: u32,
    pub column_count: u32,
    /// Edge length in pixels of the square bitmaps the host should render,
    /// or `None` if the device only shows colours and text.
    pub bitmap_size: Option<u32>,
    pub supports_color: bool,
    pub supports_text: bool,
    pub supports_brightness: bool,
    pub pincode_map: Option<PincodeMap>,
}

impl DeviceCapabilities {
    /// Capabilities of an on-screen ScreenDeck panel: colour, text and
    /// brightness are always supported.
    pub fn screendeck(column_count: u32, row_count: u32, bitmap_size: Option<u32>) -> Self {
        Self {
            row_count,
            column_count,
            bitmap_size,
            supports_color: true,
            supports_text: true,
            supports_brightness: true,
            pincode_map: None,
        }
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.column_count, self.row_count)
    }

    /// Returns `true` if switching from `self` to `other` changes anything the
    /// host fixed at registration time (grid shape or bitmap size).
    ///
    /// Such a change can only be applied by removing and re-adding the device.
    pub fn requires_reregistration(&self, other: &DeviceCapabilities) -> bool {
        self.column_count != other.column_count
            || self.row_count != other.row_count
            || self.bitmap_size != other.bitmap_size
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of_uses_row_major_order() {
        // Arrange
        let grid = GridShape::new(8, 4);

        // Act / Assert
        assert_eq!(grid.index_of(0, 0), Some(0));
        assert_eq!(grid.index_of(5, 1), Some(13));
        assert_eq!(grid.index_of(7, 3), Some(31));
    }

    #[test]
    fn test_coords_of_inverts_index_of() {
        let grid = GridShape::new(8, 4);
        assert_eq!(grid.coords_of(13), Some((5, 1)));
        for index in 0..grid.key_count() {
            let (x, y) = grid.coords_of(index).expect("in range");
            assert_eq!(grid.index_of(x, y), Some(index));
        }
    }

    #[test]
    fn test_out_of_range_coordinates_are_rejected() {
        let grid = GridShape::new(8, 4);
        assert_eq!(grid.index_of(8, 0), None);
        assert_eq!(grid.index_of(0, 4), None);
        assert_eq!(grid.coords_of(32), None);
    }

    #[test]
    fn test_zero_column_grid_has_no_coordinates() {
        let grid = GridShape::new(0, 4);
        assert_eq!(grid.key_count(), 0);
        assert_eq!(grid.coords_of(0), None);
    }

    #[test]
    fn test_shape_change_requires_reregistration() {
        let base = DeviceCapabilities::screendeck(8, 4, Some(72));

        assert!(base.requires_reregistration(&DeviceCapabilities::screendeck(5, 4, Some(72))));
        assert!(base.requires_reregistration(&DeviceCapabilities::screendeck(8, 3, Some(72))));
        assert!(base.requires_reregistration(&DeviceCapabilities::screendeck(8, 4, Some(96))));
        assert!(base.requires_reregistration(&DeviceCapabilities::screendeck(8, 4, None)));
        assert!(!base.requires_reregistration(&base.clone()));
    }

    #[test]
    fn test_device_id_displays_raw_string() {
        let id = DeviceId::from("screendeck-abc");
        assert_eq!(id.to_string(), "screendeck-abc");
        assert_eq!(id.as_str(), "screendeck-abc");
    }
}
