//! Which devices the host currently knows about, and with what shape.
//!
//! The registry keeps two lists:
//!
//! - **declared**: every locally configured device, in configuration order.
//! - **registered**: the subset the host has been sent an `ADD-DEVICE` for in
//!   the current session, with the capabilities that were sent.
//!
//! Until [`DeviceRegistry::register_all`] has run for the current session,
//! edits only touch the declared list; the pending registration sends them.
//!
//! A capability change the host fixed at registration time (columns, rows,
//! bitmap size) is applied as a remove followed by an add.  Nothing else about
//! a device ever reaches the host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use screendeck_core::{DeviceCapabilities, DeviceId};
use tracing::{debug, info};

use super::link::SatelliteLink;

/// What the host needs to know to register a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub capabilities: DeviceCapabilities,
}

#[derive(Default)]
struct RegistryInner {
    declared: Vec<DeviceDescriptor>,
    registered: HashMap<DeviceId, DeviceCapabilities>,
    /// `register_all` has run since the last disconnect.
    session_registered: bool,
}

impl RegistryInner {
    fn live(&self, link: &dyn SatelliteLink) -> bool {
        self.session_registered && link.is_connected()
    }
}

pub struct DeviceRegistry {
    link: Arc<dyn SatelliteLink>,
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new(link: Arc<dyn SatelliteLink>) -> Self {
        Self {
            link,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the declared list without sending anything.
    pub fn set_declared(&self, devices: Vec<DeviceDescriptor>) {
        self.inner().declared = devices;
    }

    /// Registers every declared device, in order.  Called once per session.
    ///
    /// Returns the number of `ADD-DEVICE` commands sent.
    pub fn register_all(&self) -> usize {
        if !self.link.is_connected() {
            debug!("skipping device registration: not connected");
            return 0;
        }
        let mut inner = self.inner();
        inner.registered.clear();
        inner.session_registered = true;
        let declared = inner.declared.clone();
        for device in &declared {
            self.link
                .add_device(&device.id, &device.name, &device.capabilities);
            inner
                .registered
                .insert(device.id.clone(), device.capabilities.clone());
        }
        info!(count = declared.len(), "registered devices with host");
        declared.len()
    }

    /// The session ended; nothing is registered any more.
    pub fn on_disconnected(&self) {
        let mut inner = self.inner();
        inner.registered.clear();
        inner.session_registered = false;
    }

    /// Adds a newly created device, registering it if the session's devices
    /// already are.
    pub fn declare(&self, device: DeviceDescriptor) {
        let mut inner = self.inner();
        inner.declared.retain(|d| d.id != device.id);
        if inner.live(&*self.link) {
            self.link
                .add_device(&device.id, &device.name, &device.capabilities);
            inner
                .registered
                .insert(device.id.clone(), device.capabilities.clone());
        }
        inner.declared.push(device);
    }

    /// Applies new capabilities to a declared device.
    ///
    /// Returns `true` if the host was sent a remove and re-add.  Changes that
    /// do not touch the grid shape or bitmap size return `false` and send
    /// nothing.
    pub fn update_capabilities(&self, id: &DeviceId, capabilities: DeviceCapabilities) -> bool {
        let mut inner = self.inner();
        let Some(device) = inner.declared.iter_mut().find(|d| &d.id == id) else {
            return false;
        };
        if !device.capabilities.requires_reregistration(&capabilities) {
            device.capabilities = capabilities;
            return false;
        }
        device.capabilities = capabilities.clone();
        let name = device.name.clone();

        if !inner.registered.contains_key(id) || !inner.live(&*self.link) {
            return false;
        }
        info!(device_id = %id, "device shape changed; re-registering");
        self.link.remove_device(id);
        self.link.add_device(id, &name, &capabilities);
        inner.registered.insert(id.clone(), capabilities);
        true
    }

    /// Forgets a device and unregisters it from the host if registered.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let mut inner = self.inner();
        let before = inner.declared.len();
        inner.declared.retain(|d| &d.id != id);
        if inner.registered.remove(id).is_some() {
            self.link.remove_device(id);
        }
        inner.declared.len() != before
    }

    /// Replaces every device, unregistering the old ones first.
    pub fn replace_all(&self, devices: Vec<DeviceDescriptor>) {
        let live = {
            let mut inner = self.inner();
            let old: Vec<DeviceId> = inner.registered.drain().map(|(id, _)| id).collect();
            for id in &old {
                self.link.remove_device(id);
            }
            inner.declared = devices;
            inner.live(&*self.link)
        };
        if live {
            self.register_all();
        }
    }

    /// The host refused the device.
    pub fn mark_rejected(&self, id: &DeviceId) {
        self.inner().registered.remove(id);
    }

    pub fn is_registered(&self, id: &DeviceId) -> bool {
        self.inner().registered.contains_key(id)
    }

    pub fn registered_capabilities(&self, id: &DeviceId) -> Option<DeviceCapabilities> {
        self.inner().registered.get(id).cloned()
    }

    pub fn declared(&self) -> Vec<DeviceDescriptor> {
        self.inner().declared.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::MockLink;
    use screendeck_core::SatelliteMessage;

    fn descriptor(id: &str, cols: u32, rows: u32) -> DeviceDescriptor {
        DeviceDescriptor {
            id: DeviceId::from(id),
            name: "ScreenDeck".to_string(),
            capabilities: DeviceCapabilities::screendeck(cols, rows, Some(72)),
        }
    }

    fn connected_registry() -> (Arc<MockLink>, DeviceRegistry) {
        let link = Arc::new(MockLink::new());
        link.set_connected(true);
        let registry = DeviceRegistry::new(link.clone());
        (link, registry)
    }

    #[test]
    fn test_register_all_adds_each_device_once_in_order() {
        // Arrange
        let (link, registry) = connected_registry();
        registry.set_declared(vec![descriptor("a", 8, 4), descriptor("b", 3, 2)]);

        // Act
        let sent = registry.register_all();

        // Assert
        assert_eq!(sent, 2);
        assert_eq!(link.added_device_ids(), vec!["a", "b"]);
        assert!(registry.is_registered(&DeviceId::from("a")));
    }

    #[test]
    fn test_register_all_while_disconnected_sends_nothing() {
        let link = Arc::new(MockLink::new());
        let registry = DeviceRegistry::new(link.clone());
        registry.set_declared(vec![descriptor("a", 8, 4)]);

        assert_eq!(registry.register_all(), 0);
        assert!(link.sent().is_empty());
        assert!(!registry.is_registered(&DeviceId::from("a")));
    }

    #[test]
    fn test_shape_change_sends_remove_then_add() {
        // Arrange
        let (link, registry) = connected_registry();
        registry.set_declared(vec![descriptor("a", 8, 4)]);
        registry.register_all();
        link.take_sent();

        // Act
        let changed =
            registry.update_capabilities(&DeviceId::from("a"), DeviceCapabilities::screendeck(5, 3, Some(72)));

        // Assert
        assert!(changed);
        let sent = link.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], SatelliteMessage::RemoveDevice { device_id } if device_id.as_str() == "a"));
        let SatelliteMessage::AddDevice(add) = &sent[1] else {
            panic!("second frame must be ADD-DEVICE");
        };
        assert_eq!(add.capabilities.column_count, 5);
        assert_eq!(add.capabilities.row_count, 3);
    }

    #[test]
    fn test_unchanged_shape_sends_nothing() {
        let (link, registry) = connected_registry();
        registry.set_declared(vec![descriptor("a", 8, 4)]);
        registry.register_all();
        link.take_sent();

        let mut caps = DeviceCapabilities::screendeck(8, 4, Some(72));
        caps.supports_brightness = false;
        let changed = registry.update_capabilities(&DeviceId::from("a"), caps);

        assert!(!changed);
        assert!(link.take_sent().is_empty());
    }

    #[test]
    fn test_shape_change_while_disconnected_applies_on_next_session() {
        // Arrange
        let link = Arc::new(MockLink::new());
        let registry = DeviceRegistry::new(link.clone());
        registry.set_declared(vec![descriptor("a", 8, 4)]);

        // Act
        registry.update_capabilities(&DeviceId::from("a"), DeviceCapabilities::screendeck(2, 2, None));
        link.set_connected(true);
        registry.register_all();

        // Assert
        let caps = registry.registered_capabilities(&DeviceId::from("a")).unwrap();
        assert_eq!(caps.column_count, 2);
        assert_eq!(caps.bitmap_size, None);
    }

    #[test]
    fn test_remove_unregisters_only_registered_devices() {
        let (link, registry) = connected_registry();
        registry.set_declared(vec![descriptor("a", 8, 4)]);
        registry.register_all();
        link.take_sent();

        assert!(registry.remove(&DeviceId::from("a")));
        assert!(!registry.remove(&DeviceId::from("ghost")));

        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        assert!(registry.declared().is_empty());
    }

    #[test]
    fn test_replace_all_removes_old_devices_before_adding_new() {
        let (link, registry) = connected_registry();
        registry.set_declared(vec![descriptor("old", 8, 4)]);
        registry.register_all();
        link.take_sent();

        registry.replace_all(vec![descriptor("new", 4, 2)]);

        let commands: Vec<String> = link
            .take_sent()
            .iter()
            .map(|m| m.command().to_string())
            .collect();
        assert_eq!(commands, vec!["REMOVE-DEVICE", "ADD-DEVICE"]);
        assert!(!registry.is_registered(&DeviceId::from("old")));
        assert!(registry.is_registered(&DeviceId::from("new")));
    }

    #[test]
    fn test_declare_registers_immediately_once_session_is_registered() {
        let (link, registry) = connected_registry();
        registry.register_all();

        registry.declare(descriptor("fresh", 8, 4));

        assert_eq!(link.added_device_ids(), vec!["fresh"]);
        assert_eq!(registry.declared().len(), 1);
    }

    #[test]
    fn test_declare_before_session_registration_waits_for_register_all() {
        // Arrange: connected, but the session's registration has not run
        let (link, registry) = connected_registry();

        // Act
        registry.declare(descriptor("fresh", 8, 4));
        let before = link.added_device_ids();
        registry.register_all();

        // Assert: exactly one ADD-DEVICE, sent by register_all
        assert!(before.is_empty());
        assert_eq!(link.added_device_ids(), vec!["fresh"]);
    }

    #[test]
    fn test_replace_all_before_session_registration_sends_nothing() {
        let (link, registry) = connected_registry();

        registry.replace_all(vec![descriptor("new", 4, 2)]);

        assert!(link.sent().is_empty());
        assert_eq!(registry.declared().len(), 1);
        assert!(!registry.is_registered(&DeviceId::from("new")));
    }

    #[test]
    fn test_disconnect_ends_session_registration() {
        let (link, registry) = connected_registry();
        registry.register_all();
        registry.on_disconnected();

        registry.declare(descriptor("fresh", 8, 4));

        assert!(link.added_device_ids().is_empty());
    }
}
