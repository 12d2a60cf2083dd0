//! Global hotkeys bound to deck keys.
//!
//! A binding maps one accelerator string (`"Ctrl+Alt+F1"`) to one
//! `(device, key)` pair.  Pressing the accelerator emulates a *tap*: key-down
//! immediately, key-up after a short delay.  Taps go straight to the link and
//! are not subject to a device's press-disable flag.
//!
//! # Uniqueness rules
//!
//! - An accelerator is bound to at most one key.  Binding it to a different
//!   key fails; binding it again to the same key succeeds.
//! - A key has at most one accelerator.  Binding a new one to a key releases
//!   the key's previous accelerator.
//!
//! The OS-facing part is behind [`ShortcutBackend`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use screendeck_core::{DeviceId, GridShape, KeyState};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::key_state_cache::KeyStateCache;
use super::link::SatelliteLink;
use super::scheduler::Scheduler;
use super::settings::AppConfig;

/// Errors reported by a [`ShortcutBackend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HotkeyError {
    /// Another application already owns the accelerator.
    #[error("accelerator {0:?} is already in use")]
    InUse(String),

    #[error("invalid accelerator {0:?}")]
    InvalidAccelerator(String),

    #[error("shortcut backend failure: {0}")]
    Backend(String),
}

/// Invoked by the backend every time the accelerator is pressed.
pub type ShortcutCallback = Arc<dyn Fn() + Send + Sync>;

/// Installs and removes system-wide keyboard shortcuts.
#[cfg_attr(test, mockall::automock)]
pub trait ShortcutBackend: Send + Sync {
    fn register(&self, accelerator: &str, callback: ShortcutCallback) -> Result<(), HotkeyError>;
    fn unregister(&self, accelerator: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyBinding {
    pub hotkey: String,
    pub device_id: DeviceId,
    pub key_index: u32,
    /// Last known look of the key, for the assignment preview.
    pub thumbnail: Option<KeyState>,
}

#[derive(Default)]
struct HotkeyTable {
    bindings: HashMap<String, HotkeyBinding>,
    shapes: HashMap<DeviceId, GridShape>,
}

pub struct HotkeyManager {
    backend: Arc<dyn ShortcutBackend>,
    link: Arc<dyn SatelliteLink>,
    cache: Arc<KeyStateCache>,
    scheduler: Scheduler,
    tap_duration: Duration,
    table: Arc<Mutex<HotkeyTable>>,
}

fn lock(table: &Mutex<HotkeyTable>) -> MutexGuard<'_, HotkeyTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HotkeyManager {
    pub fn new(
        backend: Arc<dyn ShortcutBackend>,
        link: Arc<dyn SatelliteLink>,
        cache: Arc<KeyStateCache>,
        scheduler: Scheduler,
        tap_duration: Duration,
    ) -> Self {
        Self {
            backend,
            link,
            cache,
            scheduler,
            tap_duration,
            table: Arc::new(Mutex::new(HotkeyTable::default())),
        }
    }

    /// Tells the manager the grid of `device_id`.
    ///
    /// Bindings to keys that no longer exist are released; their accelerators
    /// are returned.
    pub fn set_device_shape(&self, device_id: &DeviceId, shape: GridShape) -> Vec<String> {
        let stale: Vec<String> = {
            let mut table = lock(&self.table);
            table.shapes.insert(device_id.clone(), shape);
            table
                .bindings
                .values()
                .filter(|b| &b.device_id == device_id && b.key_index >= shape.key_count())
                .map(|b| b.hotkey.clone())
                .collect()
        };
        for hotkey in &stale {
            self.unregister(hotkey);
        }
        stale
    }

    /// Binds `hotkey` to `(device_id, key_index)`.
    ///
    /// Returns `false` if the accelerator is bound to a different key or the
    /// backend refuses it.
    pub fn register(&self, hotkey: &str, device_id: &DeviceId, key_index: u32) -> bool {
        let hotkey = hotkey.trim();
        let previous_for_key = {
            let mut table = lock(&self.table);
            if let Some(existing) = table.bindings.get_mut(hotkey) {
                if &existing.device_id != device_id || existing.key_index != key_index {
                    debug!(hotkey, bound_to = %existing.device_id, key = existing.key_index,
                        "hotkey already bound to another key");
                    return false;
                }
                existing.thumbnail = self.cache.lookup(device_id, key_index);
                return true;
            }
            table
                .bindings
                .values()
                .find(|b| &b.device_id == device_id && b.key_index == key_index)
                .map(|b| b.hotkey.clone())
        };

        // The key keeps its old accelerator if the new one is refused.
        if let Err(e) = self.backend.register(hotkey, self.tap_callback(device_id, key_index)) {
            warn!(hotkey, "could not register hotkey: {e}");
            return false;
        }

        if let Some(old) = previous_for_key {
            info!(old = %old, new = hotkey, device_id = %device_id, key = key_index,
                "replacing hotkey of key");
            self.unregister(&old);
        }

        lock(&self.table).bindings.insert(
            hotkey.to_string(),
            HotkeyBinding {
                hotkey: hotkey.to_string(),
                device_id: device_id.clone(),
                key_index,
                thumbnail: self.cache.lookup(device_id, key_index),
            },
        );
        info!(hotkey, device_id = %device_id, key = key_index, "hotkey registered");
        true
    }

    fn tap_callback(&self, device_id: &DeviceId, key_index: u32) -> ShortcutCallback {
        let link = Arc::clone(&self.link);
        let table = Arc::clone(&self.table);
        let scheduler = self.scheduler.clone();
        let tap = self.tap_duration;
        let device_id = device_id.clone();
        Arc::new(move || {
            let shape = lock(&table).shapes.get(&device_id).copied();
            let Some((x, y)) = shape.and_then(|s| s.coords_of(key_index)) else {
                warn!(device_id = %device_id, key = key_index, "hotkey target is outside the grid");
                return;
            };
            link.key_down_xy(&device_id, x, y);
            let link = Arc::clone(&link);
            let device_id = device_id.clone();
            scheduler.schedule(tap, async move {
                link.key_up_xy(&device_id, x, y);
            });
        })
    }

    /// Releases `hotkey`.  Unbound accelerators are ignored.
    pub fn unregister(&self, hotkey: &str) -> bool {
        let removed = lock(&self.table).bindings.remove(hotkey.trim());
        match removed {
            Some(binding) => {
                self.backend.unregister(&binding.hotkey);
                debug!(hotkey = %binding.hotkey, "hotkey unregistered");
                true
            }
            None => false,
        }
    }

    /// Releases every binding of `device_id` and returns the accelerators.
    pub fn unregister_all_for_device(&self, device_id: &DeviceId) -> Vec<String> {
        let hotkeys: Vec<String> = {
            let mut table = lock(&self.table);
            table.shapes.remove(device_id);
            table
                .bindings
                .values()
                .filter(|b| &b.device_id == device_id)
                .map(|b| b.hotkey.clone())
                .collect()
        };
        for hotkey in &hotkeys {
            self.unregister(hotkey);
        }
        hotkeys
    }

    pub fn unregister_all(&self) {
        let bindings: Vec<HotkeyBinding> = lock(&self.table)
            .bindings
            .drain()
            .map(|(_, b)| b)
            .collect();
        for binding in &bindings {
            self.backend.unregister(&binding.hotkey);
        }
        if !bindings.is_empty() {
            info!(count = bindings.len(), "released all hotkeys");
        }
    }

    /// Registers every per-key hotkey in `config` and records device shapes.
    ///
    /// Returns the number of bindings installed.
    pub fn load_from_config(&self, config: &AppConfig) -> usize {
        let mut installed = 0;
        for device in &config.devices {
            lock(&self.table).shapes.insert(device.id.clone(), device.shape());
            for (key_index, hotkey) in device.hotkeys() {
                if self.register(&hotkey, &device.id, key_index) {
                    installed += 1;
                }
            }
        }
        installed
    }

    /// Updates the cached thumbnail of whichever binding targets this key.
    pub fn refresh_thumbnail(&self, device_id: &DeviceId, key_index: u32, state: &KeyState) {
        let mut table = lock(&self.table);
        if let Some(binding) = table
            .bindings
            .values_mut()
            .find(|b| &b.device_id == device_id && b.key_index == key_index)
        {
            binding.thumbnail = Some(state.clone());
        }
    }

    pub fn binding(&self, hotkey: &str) -> Option<HotkeyBinding> {
        lock(&self.table).bindings.get(hotkey.trim()).cloned()
    }

    pub fn hotkey_for(&self, device_id: &DeviceId, key_index: u32) -> Option<String> {
        lock(&self.table)
            .bindings
            .values()
            .find(|b| &b.device_id == device_id && b.key_index == key_index)
            .map(|b| b.hotkey.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.table).bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::MockLink;
    use crate::infrastructure::shortcuts::InMemoryShortcutBackend;
    use mockall::predicate::eq;
    use screendeck_core::{Bitmap, SatelliteMessage};

    struct Fixture {
        backend: Arc<InMemoryShortcutBackend>,
        link: Arc<MockLink>,
        cache: Arc<KeyStateCache>,
        manager: HotkeyManager,
        pad: DeviceId,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryShortcutBackend::new());
        let link = Arc::new(MockLink::new());
        link.set_connected(true);
        let cache = Arc::new(KeyStateCache::new());
        let manager = HotkeyManager::new(
            backend.clone(),
            link.clone(),
            cache.clone(),
            Scheduler::current(),
            Duration::from_millis(100),
        );
        let pad = DeviceId::from("pad");
        manager.set_device_shape(&pad, GridShape::new(8, 4));
        Fixture {
            backend,
            link,
            cache,
            manager,
            pad,
        }
    }

    #[tokio::test]
    async fn test_rebinding_to_other_key_fails_and_keeps_original() {
        // Arrange
        let f = fixture();

        // Act
        let first = f.manager.register("Ctrl+Alt+F1", &f.pad, 3);
        let second = f.manager.register("Ctrl+Alt+F1", &f.pad, 7);

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(f.manager.binding("Ctrl+Alt+F1").unwrap().key_index, 3);
    }

    #[tokio::test]
    async fn test_rebinding_to_same_key_succeeds() {
        let f = fixture();

        assert!(f.manager.register("Ctrl+Alt+F1", &f.pad, 3));
        assert!(f.manager.register("Ctrl+Alt+F1", &f.pad, 3));

        assert_eq!(f.manager.len(), 1);
        assert_eq!(f.backend.registered(), vec!["Ctrl+Alt+F1".to_string()]);
    }

    #[tokio::test]
    async fn test_new_hotkey_for_key_releases_previous_one() {
        // Arrange
        let f = fixture();
        f.manager.register("F13", &f.pad, 0);

        // Act
        let ok = f.manager.register("F14", &f.pad, 0);

        // Assert
        assert!(ok);
        assert!(f.manager.binding("F13").is_none());
        assert!(!f.backend.is_registered("F13"));
        assert_eq!(f.manager.hotkey_for(&f.pad, 0).as_deref(), Some("F14"));
    }

    #[tokio::test]
    async fn test_refused_replacement_keeps_previous_hotkey() {
        // Arrange
        let f = fixture();
        f.manager.register("Ctrl+F1", &f.pad, 3);
        f.backend.reserve("Ctrl+F2");

        // Act
        let ok = f.manager.register("Ctrl+F2", &f.pad, 3);

        // Assert
        assert!(!ok);
        assert!(f.backend.is_registered("Ctrl+F1"));
        assert_eq!(f.manager.hotkey_for(&f.pad, 3).as_deref(), Some("Ctrl+F1"));
        assert!(f.manager.binding("Ctrl+F2").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_emits_tap_with_release_after_delay() {
        // Arrange
        let f = fixture();
        f.manager.register("Ctrl+Alt+F1", &f.pad, 13);

        // Act
        assert!(f.backend.trigger("Ctrl+Alt+F1"));
        let after_press = f.link.sent();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Assert: key 13 on an 8-wide grid is x=5, y=1
        assert_eq!(
            after_press,
            vec![SatelliteMessage::KeyPress {
                device_id: f.pad.clone(),
                key: screendeck_core::protocol::messages::KeyRef::at(5, 1),
                pressed: true,
            }]
        );
        let sent = f.link.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1], SatelliteMessage::KeyPress { pressed: false, .. }));
    }

    #[tokio::test]
    async fn test_thumbnail_is_captured_and_refreshed() {
        // Arrange
        let f = fixture();
        let first = KeyState {
            bitmap: Some(Bitmap::from(vec![1])),
            ..KeyState::default()
        };
        f.cache.record_draw(&f.pad, 2, first.clone());
        f.manager.register("F15", &f.pad, 2);
        let captured = f.manager.binding("F15").unwrap().thumbnail;

        // Act
        let second = KeyState {
            bitmap: Some(Bitmap::from(vec![2])),
            ..KeyState::default()
        };
        f.manager.refresh_thumbnail(&f.pad, 2, &second);

        // Assert
        assert_eq!(captured, Some(first));
        assert_eq!(f.manager.binding("F15").unwrap().thumbnail, Some(second));
    }

    #[tokio::test]
    async fn test_unregister_all_for_device_leaves_other_devices() {
        let f = fixture();
        let other = DeviceId::from("other");
        f.manager.set_device_shape(&other, GridShape::new(2, 2));
        f.manager.register("F1", &f.pad, 0);
        f.manager.register("F2", &f.pad, 1);
        f.manager.register("F3", &other, 0);

        let mut removed = f.manager.unregister_all_for_device(&f.pad);
        removed.sort();

        assert_eq!(removed, vec!["F1", "F2"]);
        assert_eq!(f.backend.registered(), vec!["F3".to_string()]);
        assert!(!f.manager.unregister("F1"));
    }

    #[tokio::test]
    async fn test_shrinking_grid_releases_out_of_range_bindings() {
        let f = fixture();
        f.manager.register("F1", &f.pad, 1);
        f.manager.register("F2", &f.pad, 30);

        let released = f.manager.set_device_shape(&f.pad, GridShape::new(4, 2));

        assert_eq!(released, vec!["F2"]);
        assert!(f.manager.binding("F1").is_some());
    }

    #[tokio::test]
    async fn test_backend_refusal_returns_false() {
        // Arrange
        let mut backend = MockShortcutBackend::new();
        backend
            .expect_register()
            .with(eq("Ctrl+Q"), mockall::predicate::always())
            .times(1)
            .returning(|accel, _| Err(HotkeyError::InUse(accel.to_string())));
        backend.expect_unregister().never();
        let manager = HotkeyManager::new(
            Arc::new(backend),
            Arc::new(MockLink::new()),
            Arc::new(KeyStateCache::new()),
            Scheduler::current(),
            Duration::from_millis(100),
        );

        // Act
        let ok = manager.register("Ctrl+Q", &DeviceId::from("pad"), 0);

        // Assert
        assert!(!ok);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_config_registers_configured_hotkeys() {
        // Arrange
        let f = fixture();
        let mut config = AppConfig::default();
        let mut device = crate::application::settings::DeviceConfig::new("pad");
        device.key_mut(4).hotkey = Some("Ctrl+1".to_string());
        device.key_mut(5).hotkey = Some("Ctrl+2".to_string());
        config.devices.push(device);

        // Act
        let installed = f.manager.load_from_config(&config);

        // Assert
        assert_eq!(installed, 2);
        assert_eq!(f.manager.hotkey_for(&f.pad, 5).as_deref(), Some("Ctrl+2"));
    }
}
