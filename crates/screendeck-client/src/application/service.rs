//! DeckService: the commands the presentation layer issues, and the glue
//! that routes link events to the registry, cache and consumers.
//!
//! # Event flow (for beginners)
//!
//! ```text
//!   SatelliteLink ──► pump task ──┬─► Connected     ─► registration debounce ─► DeviceRegistry
//!                                 ├─► Disconnected  ─► DeviceRegistry + ReconnectSupervisor
//!                                 ├─► Draw / Clear  ─► DrawPipeline ─► KeyStateCache ─► subscribers
//!                                 └─► everything else ───────────────────────────────► subscribers
//! ```
//!
//! Every collaborator is handed in through a [`DeckContext`]; the service
//! holds no global state.  Configuration edits are persisted through the
//! [`ConfigStore`] seam right after they are applied.  A failed save is
//! logged and otherwise ignored: the in-memory record stays authoritative.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use screendeck_core::{
    ConnectionState, DeckEvent, DeviceId, EncoderMode, GridShape, KeyState,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::device_registry::{DeviceDescriptor, DeviceRegistry};
use super::draw_queue::{DrawHandler, DrawPipeline};
use super::events::{EventBus, Subscription};
use super::hotkeys::{HotkeyManager, ShortcutBackend};
use super::key_state_cache::KeyStateCache;
use super::link::SatelliteLink;
use super::reconnect::{ReconnectPolicy, ReconnectSupervisor};
use super::scheduler::{Scheduler, TaskHandle};
use super::settings::{
    generate_device_id, generate_profile_id, AppConfig, ConfigStore, DeviceConfig, ProfileConfig,
};

/// Everything the service needs from the outside.
pub struct DeckContext {
    pub link: Arc<dyn SatelliteLink>,
    pub shortcuts: Arc<dyn ShortcutBackend>,
    pub store: Arc<dyn ConfigStore>,
    pub scheduler: Scheduler,
    pub config: AppConfig,
}

type SharedConfig = Arc<Mutex<AppConfig>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn descriptor_of(device: &DeviceConfig) -> DeviceDescriptor {
    DeviceDescriptor {
        id: device.id.clone(),
        name: device.name.clone(),
        capabilities: device.capabilities(),
    }
}

pub struct DeckService {
    link: Arc<dyn SatelliteLink>,
    scheduler: Scheduler,
    store: Arc<dyn ConfigStore>,
    config: SharedConfig,
    events: EventBus<DeckEvent>,
    cache: Arc<KeyStateCache>,
    registry: DeviceRegistry,
    hotkeys: Arc<HotkeyManager>,
    supervisor: ReconnectSupervisor,
    pipeline: DrawPipeline,
    registration: Mutex<Option<TaskHandle>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DeckService {
    pub fn new(ctx: DeckContext) -> Arc<Self> {
        let DeckContext {
            link,
            shortcuts,
            store,
            scheduler,
            config,
        } = ctx;

        let cache = Arc::new(KeyStateCache::new());
        let events = EventBus::new();
        let hotkeys = Arc::new(HotkeyManager::new(
            shortcuts,
            Arc::clone(&link),
            Arc::clone(&cache),
            scheduler.clone(),
            config.timing.hotkey_tap(),
        ));
        let supervisor = ReconnectSupervisor::new(
            Arc::clone(&link),
            scheduler.clone(),
            ReconnectPolicy::from(&config.timing),
            config.host.address.clone(),
            config.host.port,
        );
        let config: SharedConfig = Arc::new(Mutex::new(config));
        let renderer = Arc::new(RenderHandler {
            config: Arc::clone(&config),
            cache: Arc::clone(&cache),
            hotkeys: Arc::clone(&hotkeys),
            events: events.clone(),
        });

        Arc::new(Self {
            registry: DeviceRegistry::new(Arc::clone(&link)),
            pipeline: DrawPipeline::new(renderer, scheduler.clone()),
            link,
            scheduler,
            store,
            config,
            events,
            cache,
            hotkeys,
            supervisor,
            registration: Mutex::new(None),
            pump: Mutex::new(None),
        })
    }

    /// Starts listening to the link, installs configured hotkeys and kicks
    /// off the first connection attempt.
    pub fn start(self: &Arc<Self>) {
        let mut inbound = self.link.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let pump = self.scheduler.spawn(async move {
            while let Some(event) = inbound.recv().await {
                let Some(service) = weak.upgrade() else {
                    break;
                };
                service.on_link_event(event);
            }
        });
        if let Some(previous) = lock(&self.pump).replace(pump) {
            previous.abort();
        }

        let snapshot = self.config();
        self.registry
            .set_declared(snapshot.devices.iter().map(descriptor_of).collect());
        let installed = self.hotkeys.load_from_config(&snapshot);
        info!(
            devices = snapshot.devices.len(),
            hotkeys = installed,
            host = %snapshot.host.address,
            port = snapshot.host.port,
            "deck service started"
        );
        self.supervisor.start();
    }

    fn on_link_event(self: &Arc<Self>, event: DeckEvent) {
        match &event {
            DeckEvent::Connected => {
                self.schedule_registration();
                self.events.publish(event);
            }
            DeckEvent::Disconnected => {
                self.cancel_registration();
                self.registry.on_disconnected();
                self.supervisor.on_connection_lost();
                self.events.publish(event);
            }
            DeckEvent::Draw { .. }
            | DeckEvent::Brightness { .. }
            | DeckEvent::ClearDeck { .. }
            | DeckEvent::LockedState { .. } => self.pipeline.submit(event),
            DeckEvent::DeviceRejected { device_id, message } => {
                warn!(%device_id, %message, "host rejected device");
                self.registry.mark_rejected(device_id);
                self.events.publish(event);
            }
            DeckEvent::Error { error, detail } => {
                debug!(code = error.code(), %detail, "link error");
                self.events.publish(event);
            }
            DeckEvent::DeviceAdded { .. } => {
                self.events.publish(event);
            }
        }
    }

    fn schedule_registration(self: &Arc<Self>) {
        let delay = lock(&self.config).timing.registration_delay();
        let weak = Arc::downgrade(self);
        let handle = self.scheduler.schedule(delay, async move {
            if let Some(service) = weak.upgrade() {
                service.registry.register_all();
            }
        });
        if let Some(previous) = lock(&self.registration).replace(handle) {
            previous.cancel();
        }
    }

    fn cancel_registration(&self) {
        if let Some(pending) = lock(&self.registration).take() {
            pending.cancel();
        }
    }

    fn persist(&self) {
        let snapshot = lock(&self.config).clone();
        if let Err(e) = self.store.save(&snapshot) {
            warn!("failed to save configuration: {e}");
        }
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    /// Resolves `key_index` to `(x, y)` unless the device ignores presses.
    fn input_target(&self, device_id: &DeviceId, key_index: u32) -> Option<(u32, u32)> {
        let config = lock(&self.config);
        let Some(device) = config.device(device_id) else {
            debug!(%device_id, "input for unknown device ignored");
            return None;
        };
        if device.disable_press {
            debug!(%device_id, key_index, "input ignored: presses disabled");
            return None;
        }
        let coords = device.shape().coords_of(key_index);
        if coords.is_none() {
            debug!(%device_id, key_index, "input outside the grid ignored");
        }
        coords
    }

    pub fn key_down(&self, device_id: &DeviceId, key_index: u32) {
        if let Some((x, y)) = self.input_target(device_id, key_index) {
            self.link.key_down_xy(device_id, x, y);
        }
    }

    pub fn key_up(&self, device_id: &DeviceId, key_index: u32) {
        if let Some((x, y)) = self.input_target(device_id, key_index) {
            self.link.key_up_xy(device_id, x, y);
        }
    }

    pub fn rotate_left(&self, device_id: &DeviceId, key_index: u32) {
        if let Some((x, y)) = self.input_target(device_id, key_index) {
            self.link.rotate_left_xy(device_id, x, y);
        }
    }

    pub fn rotate_right(&self, device_id: &DeviceId, key_index: u32) {
        if let Some((x, y)) = self.input_target(device_id, key_index) {
            self.link.rotate_right_xy(device_id, x, y);
        }
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    /// Adds a device with default settings and registers it if connected.
    pub fn create_device(&self) -> DeviceId {
        let device = DeviceConfig::new(generate_device_id());
        let id = device.id.clone();
        let descriptor = descriptor_of(&device);
        self.hotkeys.set_device_shape(&id, device.shape());
        lock(&self.config).devices.push(device);
        self.registry.declare(descriptor);
        self.persist();
        info!(device_id = %id, "device created");
        id
    }

    /// Deletes a device, unregistering it and dropping its keys and hotkeys.
    pub fn remove_device(&self, device_id: &DeviceId) -> bool {
        let removed = {
            let mut config = lock(&self.config);
            let before = config.devices.len();
            config.devices.retain(|d| &d.id != device_id);
            config.devices.len() != before
        };
        self.registry.remove(device_id);
        self.cache.purge_device(device_id);
        let released = self.hotkeys.unregister_all_for_device(device_id);
        if removed {
            self.persist();
            info!(%device_id, hotkeys = released.len(), "device removed");
        }
        removed
    }

    /// Edits a device's settings.
    ///
    /// Returns `None` for an unknown device, otherwise whether the host was
    /// sent a remove and re-add.
    pub fn update_device<F>(&self, device_id: &DeviceId, edit: F) -> Option<bool>
    where
        F: FnOnce(&mut DeviceConfig),
    {
        let (old_shape, new_shape, capabilities) = {
            let mut config = lock(&self.config);
            let device = config.device_mut(device_id)?;
            let old_shape = device.shape();
            edit(device);
            device.id = device_id.clone();
            let new_shape = device.shape();
            if new_shape != old_shape {
                let count = new_shape.key_count();
                device
                    .keys
                    .retain(|k, _| k.parse::<u32>().map_or(false, |index| index < count));
            }
            (old_shape, new_shape, device.capabilities())
        };

        let reregistered = self.registry.update_capabilities(device_id, capabilities);
        if new_shape != old_shape {
            self.reshape(device_id, new_shape);
        }
        self.persist();
        Some(reregistered)
    }

    fn reshape(&self, device_id: &DeviceId, shape: GridShape) {
        let released = self.hotkeys.set_device_shape(device_id, shape);
        self.cache.truncate(device_id, shape.key_count());
        if !released.is_empty() {
            debug!(%device_id, ?released, "hotkeys released by resize");
        }
    }

    // ── Keys ──────────────────────────────────────────────────────────────────

    /// Binds `hotkey` to a key and stores it in the configuration.
    pub fn register_hotkey(&self, hotkey: &str, device_id: &DeviceId, key_index: u32) -> bool {
        let exists = lock(&self.config)
            .device(device_id)
            .map_or(false, |d| key_index < d.shape().key_count());
        if !exists || !self.hotkeys.register(hotkey, device_id, key_index) {
            return false;
        }
        if let Some(device) = lock(&self.config).device_mut(device_id) {
            device.key_mut(key_index).hotkey = Some(hotkey.trim().to_string());
        }
        self.persist();
        true
    }

    pub fn unregister_hotkey(&self, hotkey: &str) -> bool {
        let Some(binding) = self.hotkeys.binding(hotkey) else {
            return false;
        };
        self.hotkeys.unregister(hotkey);
        if let Some(device) = lock(&self.config).device_mut(&binding.device_id) {
            device.key_mut(binding.key_index).hotkey = None;
        }
        self.persist();
        true
    }

    /// Flips rotary mode of a key.  Returns the new `is_encoder` value.
    pub fn toggle_encoder(&self, device_id: &DeviceId, key_index: u32) -> Option<bool> {
        let mode = {
            let mut config = lock(&self.config);
            let device = config.device_mut(device_id)?;
            if key_index >= device.shape().key_count() {
                return None;
            }
            let key = device.key_mut(key_index);
            key.is_encoder = !key.is_encoder;
            EncoderMode {
                is_encoder: key.is_encoder,
                step_size: key.step_size,
            }
        };
        let state = self.cache.set_encoder(device_id, key_index, mode);
        self.pipeline.submit(DeckEvent::Draw {
            device_id: device_id.clone(),
            key_index,
            state,
        });
        self.persist();
        Some(mode.is_encoder)
    }

    // ── Connection ────────────────────────────────────────────────────────────

    /// Points the client at a new host and reconnects.
    pub async fn set_host(&self, address: &str, port: u16) {
        {
            let mut config = lock(&self.config);
            config.host.address = address.to_string();
            config.host.port = port;
        }
        self.persist();
        self.supervisor.reconfigure(address, port).await;
    }

    pub async fn disconnect(&self) {
        self.cancel_registration();
        self.supervisor.disconnect().await;
    }

    /// Stops every timer, releases hotkeys and closes the connection.
    pub async fn shutdown(&self) {
        self.cancel_registration();
        self.supervisor.shutdown();
        self.hotkeys.unregister_all();
        self.link.disconnect().await;
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        info!("deck service stopped");
    }

    // ── Profiles ──────────────────────────────────────────────────────────────

    /// Saves the current device list under a new profile id.
    pub fn save_profile(&self, name: &str) -> String {
        let id = generate_profile_id();
        {
            let mut config = lock(&self.config);
            let devices = config.devices.clone();
            config.profiles.insert(
                id.clone(),
                ProfileConfig {
                    name: name.to_string(),
                    devices,
                },
            );
        }
        self.persist();
        id
    }

    /// Replaces every device with the profile's devices.
    pub fn load_profile(&self, profile_id: &str) -> bool {
        let (previous, snapshot) = {
            let mut config = lock(&self.config);
            let Some(profile) = config.profiles.get(profile_id) else {
                return false;
            };
            let devices = profile.devices.clone();
            let previous: Vec<DeviceId> = config.devices.iter().map(|d| d.id.clone()).collect();
            config.devices = devices;
            (previous, config.clone())
        };

        self.hotkeys.unregister_all();
        for id in &previous {
            self.cache.purge_device(id);
        }
        self.registry
            .replace_all(snapshot.devices.iter().map(descriptor_of).collect());
        self.hotkeys.load_from_config(&snapshot);
        self.persist();
        info!(profile_id, devices = snapshot.devices.len(), "profile loaded");
        true
    }

    pub fn delete_profile(&self, profile_id: &str) -> bool {
        let removed = lock(&self.config).profiles.remove(profile_id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    pub fn next_profile_name(&self) -> String {
        lock(&self.config).next_profile_name()
    }

    /// `(id, name)` of every saved profile.
    pub fn profiles(&self) -> Vec<(String, String)> {
        lock(&self.config)
            .profiles
            .iter()
            .map(|(id, p)| (id.clone(), p.name.clone()))
            .collect()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> Subscription<DeckEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_state(&self) -> Subscription<ConnectionState> {
        self.supervisor.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn key_state(&self, device_id: &DeviceId, key_index: u32) -> Option<KeyState> {
        self.cache.lookup(device_id, key_index)
    }

    /// Every cached key of a device, for a newly opened window.
    pub fn snapshot(&self, device_id: &DeviceId) -> Vec<(u32, KeyState)> {
        self.cache.device_keys(device_id)
    }

    pub fn config(&self) -> AppConfig {
        lock(&self.config).clone()
    }

    pub fn hotkeys(&self) -> &HotkeyManager {
        &self.hotkeys
    }

    pub fn is_registered(&self, device_id: &DeviceId) -> bool {
        self.registry.is_registered(device_id)
    }
}

// ── Render handler ────────────────────────────────────────────────────────────

/// Applies render events to the cache, then republishes them.
struct RenderHandler {
    config: SharedConfig,
    cache: Arc<KeyStateCache>,
    hotkeys: Arc<HotkeyManager>,
    events: EventBus<DeckEvent>,
}

#[async_trait]
impl DrawHandler for RenderHandler {
    async fn handle(&self, event: DeckEvent) {
        match event {
            DeckEvent::Draw {
                device_id,
                key_index,
                mut state,
            } => {
                let encoder = {
                    let config = lock(&self.config);
                    match config.device(&device_id) {
                        Some(device) if key_index < device.shape().key_count() => {
                            Some(device.encoder_mode(key_index))
                        }
                        Some(_) => None,
                        None => {
                            debug!(%device_id, "draw for unknown device ignored");
                            return;
                        }
                    }
                };
                let Some(encoder) = encoder else {
                    debug!(%device_id, key_index, "draw outside the grid ignored");
                    return;
                };
                state.encoder = encoder;
                self.cache.record_draw(&device_id, key_index, state.clone());
                self.hotkeys.refresh_thumbnail(&device_id, key_index, &state);
                self.events.publish(DeckEvent::Draw {
                    device_id,
                    key_index,
                    state,
                });
            }
            DeckEvent::ClearDeck { device_id } => {
                self.cache.clear(&device_id);
                self.events.publish(DeckEvent::ClearDeck { device_id });
            }
            other => {
                self.events.publish(other);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::MockLink;
    use crate::infrastructure::shortcuts::InMemoryShortcutBackend;
    use crate::infrastructure::storage::config::MemoryConfigStore;
    use screendeck_core::{Rgb, SatelliteMessage};
    use std::time::Duration;

    struct Fixture {
        link: Arc<MockLink>,
        shortcuts: Arc<InMemoryShortcutBackend>,
        store: Arc<MemoryConfigStore>,
        service: Arc<DeckService>,
        device: DeviceId,
    }

    fn fixture() -> Fixture {
        let link = Arc::new(MockLink::new());
        let shortcuts = Arc::new(InMemoryShortcutBackend::new());
        let store = Arc::new(MemoryConfigStore::new());
        let mut config = AppConfig::default();
        let mut device = DeviceConfig::new("pad");
        device.column_count = 4;
        device.row_count = 2;
        config.devices.push(device);
        let service = DeckService::new(DeckContext {
            link: Arc::clone(&link) as Arc<dyn SatelliteLink>,
            shortcuts: Arc::clone(&shortcuts) as Arc<dyn ShortcutBackend>,
            store: Arc::clone(&store) as Arc<dyn ConfigStore>,
            scheduler: Scheduler::current(),
            config,
        });
        Fixture {
            link,
            shortcuts,
            store,
            service,
            device: DeviceId::from("pad"),
        }
    }

    fn red() -> KeyState {
        KeyState {
            color: Some(Rgb::new(255, 0, 0)),
            ..KeyState::default()
        }
    }

    #[tokio::test]
    async fn test_key_down_sends_grid_coordinates() {
        // Arrange
        let f = fixture();
        f.link.set_connected(true);

        // Act: key 6 on a 4-wide grid is x=2, y=1
        f.service.key_down(&f.device, 6);

        // Assert
        assert!(matches!(
            f.link.sent().as_slice(),
            [SatelliteMessage::KeyPress { key, pressed: true, .. }] if key.to_string() == "1/2"
        ));
    }

    #[tokio::test]
    async fn test_disable_press_drops_input() {
        // Arrange
        let f = fixture();
        f.link.set_connected(true);
        f.service.update_device(&f.device, |d| d.disable_press = true);

        // Act
        f.service.key_down(&f.device, 0);
        f.service.rotate_right(&f.device, 0);

        // Assert
        assert!(f.link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_input_outside_grid_is_ignored() {
        let f = fixture();
        f.link.set_connected(true);

        f.service.key_up(&f.device, 8);

        assert!(f.link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_draw_is_cached_with_encoder_mode_and_republished() {
        // Arrange
        let f = fixture();
        f.service.start();
        let mut events = f.service.subscribe();
        f.service.toggle_encoder(&f.device, 2);

        // Act
        f.link.emit(DeckEvent::Draw {
            device_id: f.device.clone(),
            key_index: 2,
            state: red(),
        });
        let mut published = None;
        while let Some(event) = events.recv().await {
            if let DeckEvent::Draw { ref state, .. } = event {
                if state.color.is_some() {
                    published = Some(event);
                    break;
                }
            }
        }

        // Assert
        let cached = f.service.key_state(&f.device, 2).expect("cached");
        assert!(cached.encoder.is_encoder);
        assert_eq!(cached.color, Some(Rgb::new(255, 0, 0)));
        assert!(matches!(published, Some(DeckEvent::Draw { key_index: 2, .. })));
    }

    #[tokio::test]
    async fn test_toggle_encoder_flips_and_persists() {
        let f = fixture();

        assert_eq!(f.service.toggle_encoder(&f.device, 1), Some(true));
        assert_eq!(f.service.toggle_encoder(&f.device, 1), Some(false));
        assert_eq!(f.service.toggle_encoder(&f.device, 99), None);

        let saved = f.store.last().expect("saved");
        assert_eq!(saved.devices[0].key(1).map(|k| k.is_encoder), Some(false));
    }

    #[tokio::test]
    async fn test_refused_hotkey_leaves_configured_hotkey_live() {
        // Arrange
        let f = fixture();
        assert!(f.service.register_hotkey("Ctrl+F1", &f.device, 3));
        f.shortcuts.reserve("Ctrl+F2");

        // Act
        let ok = f.service.register_hotkey("Ctrl+F2", &f.device, 3);

        // Assert: configuration and the installed shortcut still agree
        assert!(!ok);
        assert!(f.shortcuts.is_registered("Ctrl+F1"));
        let config = f.service.config();
        let hotkey = config
            .device(&f.device)
            .and_then(|d| d.key(3))
            .and_then(|k| k.hotkey.clone());
        assert_eq!(hotkey.as_deref(), Some("Ctrl+F1"));
    }

    #[tokio::test]
    async fn test_register_hotkey_persists_and_rejects_unknown_key() {
        // Arrange
        let f = fixture();

        // Act
        let ok = f.service.register_hotkey("Ctrl+F1", &f.device, 3);
        let outside = f.service.register_hotkey("Ctrl+F2", &f.device, 8);

        // Assert
        assert!(ok);
        assert!(!outside);
        assert!(f.shortcuts.is_registered("Ctrl+F1"));
        let cfg = f.service.config();
        assert_eq!(
            cfg.devices[0].key(3).and_then(|k| k.hotkey.clone()),
            Some("Ctrl+F1".to_string())
        );
    }

    #[tokio::test]
    async fn test_unregister_hotkey_clears_config() {
        let f = fixture();
        f.service.register_hotkey("Ctrl+F1", &f.device, 3);

        assert!(f.service.unregister_hotkey("Ctrl+F1"));
        assert!(!f.service.unregister_hotkey("Ctrl+F1"));

        assert!(!f.shortcuts.is_registered("Ctrl+F1"));
        assert_eq!(f.service.config().devices[0].key(3).and_then(|k| k.hotkey.clone()), None);
    }

    #[tokio::test]
    async fn test_shrinking_device_drops_out_of_range_keys() {
        // Arrange
        let f = fixture();
        f.service.register_hotkey("Ctrl+F8", &f.device, 7);
        f.service.toggle_encoder(&f.device, 7);

        // Act
        f.service.update_device(&f.device, |d| d.row_count = 1);

        // Assert
        assert!(!f.shortcuts.is_registered("Ctrl+F8"));
        assert_eq!(f.service.key_state(&f.device, 7), None);
        assert!(f.service.config().devices[0].key(7).is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_device_returns_none() {
        let f = fixture();
        assert_eq!(f.service.update_device(&DeviceId::from("ghost"), |d| d.row_count = 9), None);
    }

    #[tokio::test]
    async fn test_create_device_registers_when_session_is_registered() {
        let f = fixture();
        f.link.set_connected(true);
        f.service.registry.register_all();
        f.link.take_sent();

        let id = f.service.create_device();

        assert!(id.as_str().starts_with("screendeck-"));
        assert_eq!(f.link.added_device_ids(), vec![id.to_string()]);
        assert_eq!(f.service.config().devices.len(), 2);
    }

    #[tokio::test]
    async fn test_profiles_save_list_and_delete() {
        let f = fixture();

        let name = f.service.next_profile_name();
        let id = f.service.save_profile(&name);

        assert_eq!(name, "Profile 1");
        assert_eq!(f.service.profiles(), vec![(id.clone(), "Profile 1".to_string())]);
        assert_eq!(f.service.next_profile_name(), "Profile 2");
        assert!(f.service.delete_profile(&id));
        assert!(!f.service.load_profile(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_hotkeys_and_sends_quit() {
        // Arrange
        let f = fixture();
        f.service.register_hotkey("Ctrl+F1", &f.device, 0);
        f.service.start();
        tokio::time::sleep(Duration::from_millis(801)).await;
        assert!(f.link.is_connected());

        // Act
        f.service.shutdown().await;

        // Assert
        assert!(f.shortcuts.registered().is_empty());
        assert_eq!(f.link.sent().last(), Some(&SatelliteMessage::Quit));
        assert_eq!(f.service.connection_state(), ConnectionState::Disconnected);
    }
}
