//! Last-known visual state of every key, per device.
//!
//! The cache is a read-through memo of what the host last drew.  Newly shown
//! windows and the hotkey-assignment preview read from it instead of waiting
//! for the host to redraw.  It never merges fields across draws: each
//! [`KeyStateCache::record_draw`] replaces the previous entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use screendeck_core::{DeviceId, EncoderMode, KeyState};

type DeviceKeys = BTreeMap<u32, KeyState>;

#[derive(Default)]
pub struct KeyStateCache {
    devices: Mutex<HashMap<DeviceId, DeviceKeys>>,
}

impl KeyStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn devices(&self) -> MutexGuard<'_, HashMap<DeviceId, DeviceKeys>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `state` for `(device_id, key_index)`, replacing any prior entry.
    pub fn record_draw(&self, device_id: &DeviceId, key_index: u32, state: KeyState) {
        self.devices()
            .entry(device_id.clone())
            .or_default()
            .insert(key_index, state);
    }

    pub fn lookup(&self, device_id: &DeviceId, key_index: u32) -> Option<KeyState> {
        self.devices()
            .get(device_id)
            .and_then(|keys| keys.get(&key_index))
            .cloned()
    }

    /// All cached keys of a device in index order.
    pub fn device_keys(&self, device_id: &DeviceId) -> Vec<(u32, KeyState)> {
        self.devices()
            .get(device_id)
            .map(|keys| keys.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default()
    }

    /// Empties every entry of a device (the host cleared the deck).
    pub fn clear(&self, device_id: &DeviceId) {
        if let Some(keys) = self.devices().get_mut(device_id) {
            keys.clear();
        }
    }

    /// Forgets a device entirely (it was deleted locally).
    pub fn purge_device(&self, device_id: &DeviceId) {
        self.devices().remove(device_id);
    }

    /// Updates the rotary-mode flags of one key and returns the resulting state.
    ///
    /// A key that was never drawn gets a blank entry carrying only the flags.
    pub fn set_encoder(&self, device_id: &DeviceId, key_index: u32, mode: EncoderMode) -> KeyState {
        let mut devices = self.devices();
        let state = devices
            .entry(device_id.clone())
            .or_default()
            .entry(key_index)
            .or_default();
        state.encoder = mode;
        state.clone()
    }

    /// Drops entries at or beyond `key_count` after a device shrank.
    pub fn truncate(&self, device_id: &DeviceId, key_count: u32) {
        if let Some(keys) = self.devices().get_mut(device_id) {
            keys.retain(|index, _| *index < key_count);
        }
    }

    pub fn len(&self, device_id: &DeviceId) -> usize {
        self.devices().get(device_id).map_or(0, BTreeMap::len)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
