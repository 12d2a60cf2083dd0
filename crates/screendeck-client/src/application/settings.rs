//! Versioned, strongly typed configuration record.
//!
//! Every default lives in one `default_*` helper and is applied through
//! `#[serde(default = "...")]`, so a config written by an older build (or an
//! empty file) still loads with sensible values.
//!
//! ```toml
//! version = 1
//! log_level = "info"
//!
//! [host]
//! address = "127.0.0.1"
//! port = 16622
//!
//! [[devices]]
//! id = "screendeck-6f1c..."
//! column_count = 8
//! row_count = 4
//!
//! [devices.keys.3]
//! hotkey = "Ctrl+Alt+F1"
//! ```
//!
//! Per-key maps are keyed by the decimal key index as a string because TOML
//! table keys are always strings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use screendeck_core::protocol::messages::{DEFAULT_HOST, DEFAULT_PORT, PRODUCT_NAME};
use screendeck_core::{DeviceCapabilities, DeviceId, EncoderMode, GridShape, Rgb};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Schema version written by this build.
pub const CONFIG_VERSION: u32 = 1;

/// Error type for configuration loading and persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The file was written by a newer build.
    #[error("config version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Persists the configuration record.
pub trait ConfigStore: Send + Sync {
    fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Devices in registration order.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Saved device lists keyed by profile id.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timer settings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_initial_connect_delay_ms")]
    pub initial_connect_delay_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_reconfigure_delay_ms")]
    pub reconfigure_delay_ms: u64,
    #[serde(default = "default_registration_delay_ms")]
    pub registration_delay_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_hotkey_tap_ms")]
    pub hotkey_tap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub id: DeviceId,
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default = "default_column_count")]
    pub column_count: u32,
    #[serde(default = "default_row_count")]
    pub row_count: u32,
    /// Edge length of key bitmaps in pixels; `0` registers the device as
    /// colour/text only.
    #[serde(default = "default_bitmap_size")]
    pub bitmap_size: u32,
    #[serde(default = "default_background_color")]
    pub background_color: Rgb,
    #[serde(default = "default_background_opacity")]
    pub background_opacity: f32,
    #[serde(default = "default_true")]
    pub always_on_top: bool,
    #[serde(default = "default_true")]
    pub movable: bool,
    /// Ignore press/release/rotate from the panel itself.
    #[serde(default)]
    pub disable_press: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, KeyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyConfig {
    #[serde(default)]
    pub is_encoder: bool,
    #[serde(default = "default_step_size")]
    pub step_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_address() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_initial_connect_delay_ms() -> u64 {
    800
}
fn default_retry_delay_ms() -> u64 {
    10_000
}
fn default_reconfigure_delay_ms() -> u64 {
    500
}
fn default_registration_delay_ms() -> u64 {
    500
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_ping_interval_ms() -> u64 {
    2_000
}
fn default_ping_timeout_ms() -> u64 {
    5_000
}
fn default_hotkey_tap_ms() -> u64 {
    100
}
fn default_device_name() -> String {
    PRODUCT_NAME.to_string()
}
fn default_column_count() -> u32 {
    8
}
fn default_row_count() -> u32 {
    4
}
fn default_bitmap_size() -> u32 {
    72
}
fn default_background_color() -> Rgb {
    Rgb::BLACK
}
fn default_background_opacity() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_step_size() -> u32 {
    screendeck_core::domain::key_state::DEFAULT_STEP_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
            host: HostConfig::default(),
            timing: TimingConfig::default(),
            devices: Vec::new(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_connect_delay_ms: default_initial_connect_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            reconfigure_delay_ms: default_reconfigure_delay_ms(),
            registration_delay_ms: default_registration_delay_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            hotkey_tap_ms: default_hotkey_tap_ms(),
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            is_encoder: false,
            step_size: default_step_size(),
            hotkey: None,
        }
    }
}

// ── Behaviour ─────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Rejects files written by a newer schema.
    pub fn check_version(&self) -> Result<(), ConfigError> {
        if self.version > CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: CONFIG_VERSION,
            });
        }
        Ok(())
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn device_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceConfig> {
        self.devices.iter_mut().find(|d| &d.id == id)
    }

    /// Adds one default device if none are configured.  Returns its id.
    pub fn seed_default_device(&mut self) -> Option<DeviceId> {
        if !self.devices.is_empty() {
            return None;
        }
        let device = DeviceConfig::new(generate_device_id());
        let id = device.id.clone();
        self.devices.push(device);
        Some(id)
    }

    /// `Profile N+1` where N is the number of saved profiles.
    pub fn next_profile_name(&self) -> String {
        format!("Profile {}", self.profiles.len() + 1)
    }
}

impl TimingConfig {
    pub fn initial_connect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_connect_delay_ms)
    }
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
    pub fn reconfigure_delay(&self) -> Duration {
        Duration::from_millis(self.reconfigure_delay_ms)
    }
    pub fn registration_delay(&self) -> Duration {
        Duration::from_millis(self.registration_delay_ms)
    }
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
    pub fn hotkey_tap(&self) -> Duration {
        Duration::from_millis(self.hotkey_tap_ms)
    }
}

impl DeviceConfig {
    /// A device with every setting at its default.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: default_device_name(),
            column_count: default_column_count(),
            row_count: default_row_count(),
            bitmap_size: default_bitmap_size(),
            background_color: default_background_color(),
            background_opacity: default_background_opacity(),
            always_on_top: true,
            movable: true,
            disable_press: false,
            hidden: false,
            keys: BTreeMap::new(),
        }
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.column_count, self.row_count)
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        let bitmap_size = (self.bitmap_size > 0).then_some(self.bitmap_size);
        DeviceCapabilities::screendeck(self.column_count, self.row_count, bitmap_size)
    }

    pub fn key(&self, index: u32) -> Option<&KeyConfig> {
        self.keys.get(&index.to_string())
    }

    /// Settings of key `index`, created with defaults if absent.
    pub fn key_mut(&mut self, index: u32) -> &mut KeyConfig {
        self.keys.entry(index.to_string()).or_default()
    }

    pub fn encoder_mode(&self, index: u32) -> EncoderMode {
        self.key(index).map_or_else(EncoderMode::default, |k| EncoderMode {
            is_encoder: k.is_encoder,
            step_size: k.step_size,
        })
    }

    /// `(key_index, hotkey)` for every key with a hotkey, in index order.
    pub fn hotkeys(&self) -> Vec<(u32, String)> {
        let mut out: Vec<(u32, String)> = self
            .keys
            .iter()
            .filter_map(|(k, v)| Some((k.parse().ok()?, v.hotkey.clone()?)))
            .collect();
        out.sort_by_key(|(index, _)| *index);
        out
    }
}

/// `screendeck-<uuid>` without dashes.
pub fn generate_device_id() -> DeviceId {
    DeviceId::new(format!("screendeck-{}", Uuid::new_v4().simple()))
}

pub fn generate_profile_id() -> String {
    format!("profile-{}", Uuid::new_v4().simple())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_loads_every_default() {
        // Arrange / Act
        let cfg: AppConfig = toml::from_str("").expect("empty TOML must load");

        // Assert
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.host.port, 16622);
        assert_eq!(cfg.host.address, "127.0.0.1");
        assert_eq!(cfg.timing.retry_delay(), Duration::from_secs(10));
        assert_eq!(cfg.timing.initial_connect_delay(), Duration::from_millis(800));
        assert_eq!(cfg.timing.hotkey_tap(), Duration::from_millis(100));
    }

    #[test]
    fn test_minimal_device_entry_gets_defaults() {
        // Arrange
        let toml_str = r#"
[[devices]]
id = "pad"

[devices.keys.3]
hotkey = "Ctrl+Alt+F1"

[devices.keys.5]
is_encoder = true
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize");

        // Assert
        let pad = &cfg.devices[0];
        assert_eq!(pad.shape(), GridShape::new(8, 4));
        assert_eq!(pad.bitmap_size, 72);
        assert_eq!(pad.background_color, Rgb::BLACK);
        assert!((pad.background_opacity - 0.5).abs() < f32::EPSILON);
        assert!(!pad.disable_press);
        assert_eq!(pad.hotkeys(), vec![(3, "Ctrl+Alt+F1".to_string())]);
        assert_eq!(
            pad.encoder_mode(5),
            EncoderMode {
                is_encoder: true,
                step_size: 10
            }
        );
        assert!(!pad.encoder_mode(0).is_encoder);
    }

    #[test]
    fn test_config_with_devices_and_profiles_round_trips() {
        // Arrange
        let mut cfg = AppConfig::default();
        let mut device = DeviceConfig::new("pad");
        device.background_color = Rgb::new(16, 32, 48);
        device.key_mut(2).hotkey = Some("F13".to_string());
        cfg.devices.push(device.clone());
        cfg.profiles.insert(
            "profile-1".to_string(),
            ProfileConfig {
                name: "Show".to_string(),
                devices: vec![device],
            },
        );

        // Act
        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&text).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
        assert!(text.contains("#102030"));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let cfg: AppConfig = toml::from_str("version = 2").unwrap();
        assert!(matches!(
            cfg.check_version(),
            Err(ConfigError::UnsupportedVersion {
                found: 2,
                supported: 1
            })
        ));
        assert!(AppConfig::default().check_version().is_ok());
    }

    #[test]
    fn test_seed_default_device_only_when_empty() {
        let mut cfg = AppConfig::default();

        let first = cfg.seed_default_device();
        let second = cfg.seed_default_device();

        let id = first.expect("first call must seed");
        assert!(id.as_str().starts_with("screendeck-"));
        assert_eq!(id.as_str().matches('-').count(), 1);
        assert!(second.is_none());
        assert_eq!(cfg.devices.len(), 1);
    }

    #[test]
    fn test_next_profile_name_counts_saved_profiles() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.next_profile_name(), "Profile 1");
        cfg.profiles.insert(
            generate_profile_id(),
            ProfileConfig {
                name: "Profile 1".to_string(),
                devices: Vec::new(),
            },
        );
        assert_eq!(cfg.next_profile_name(), "Profile 2");
    }

    #[test]
    fn test_colour_only_device_omits_bitmap_size() {
        let mut device = DeviceConfig::new("plain");
        device.bitmap_size = 0;

        let caps = device.capabilities();

        assert_eq!(caps.bitmap_size, None);
        assert_eq!(caps.column_count, 8);
        assert!(caps.supports_color);
    }
}
