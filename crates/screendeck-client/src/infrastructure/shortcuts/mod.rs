//! In-process shortcut backend.
//!
//! Real OS-level global shortcut registration is left to the embedding
//! presentation layer.  This backend keeps the accelerator → callback table in
//! memory, validates accelerator syntax, and lets the caller fire a shortcut
//! with [`InMemoryShortcutBackend::trigger`] (the CLI does this from stdin;
//! tests call it directly).
//!
//! # Accelerator syntax
//!
//! `Modifier+Modifier+Key`, e.g. `Ctrl+Alt+F1` or `Shift+A`.  Modifiers are
//! `Ctrl`/`Control`, `Alt`/`Option`, `Shift`, `Super`/`Cmd`/`Meta` and
//! `CmdOrCtrl`, case-insensitive.  Exactly one non-modifier key must come last.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::application::hotkeys::{HotkeyError, ShortcutBackend, ShortcutCallback};

const MODIFIERS: &[&str] = &[
    "ctrl", "control", "alt", "option", "shift", "super", "cmd", "command", "meta", "cmdorctrl",
];

#[derive(Default)]
pub struct InMemoryShortcutBackend {
    bindings: Mutex<HashMap<String, ShortcutCallback>>,
    /// Accelerators owned by "another application".
    reserved: Mutex<HashSet<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryShortcutBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `accelerator` as taken so that registering it fails with
    /// [`HotkeyError::InUse`].
    pub fn reserve(&self, accelerator: &str) {
        lock(&self.reserved).insert(accelerator.to_string());
    }

    /// Invokes the callback bound to `accelerator`.  Returns `false` if none.
    pub fn trigger(&self, accelerator: &str) -> bool {
        let callback = lock(&self.bindings).get(accelerator).cloned();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, accelerator: &str) -> bool {
        lock(&self.bindings).contains_key(accelerator)
    }

    /// Registered accelerators, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut out: Vec<String> = lock(&self.bindings).keys().cloned().collect();
        out.sort();
        out
    }
}

/// Checks `Modifier+...+Key` syntax.
pub fn validate_accelerator(accelerator: &str) -> Result<(), HotkeyError> {
    let invalid = || HotkeyError::InvalidAccelerator(accelerator.to_string());
    let parts: Vec<&str> = accelerator.split('+').map(str::trim).collect();
    let (key, modifiers) = parts.split_last().ok_or_else(invalid)?;
    if key.is_empty() || MODIFIERS.contains(&key.to_ascii_lowercase().as_str()) {
        return Err(invalid());
    }
    if modifiers
        .iter()
        .any(|m| !MODIFIERS.contains(&m.to_ascii_lowercase().as_str()))
    {
        return Err(invalid());
    }
    Ok(())
}

impl ShortcutBackend for InMemoryShortcutBackend {
    fn register(&self, accelerator: &str, callback: ShortcutCallback) -> Result<(), HotkeyError> {
        validate_accelerator(accelerator)?;
        if lock(&self.reserved).contains(accelerator) {
            return Err(HotkeyError::InUse(accelerator.to_string()));
        }
        lock(&self.bindings).insert(accelerator.to_string(), callback);
        debug!(accelerator, "shortcut installed");
        Ok(())
    }

    fn unregister(&self, accelerator: &str) {
        lock(&self.bindings).remove(accelerator);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_validate_accelerator_accepts_common_forms() {
        for accel in ["F13", "Ctrl+Alt+F1", "shift+A", "CmdOrCtrl+Shift+9"] {
            assert!(validate_accelerator(accel).is_ok(), "{accel} must be valid");
        }
    }

    #[test]
    fn test_validate_accelerator_rejects_malformed_input() {
        for accel in ["", "Ctrl+", "Ctrl+Alt", "Hyper+A", "Ctrl++"] {
            assert!(validate_accelerator(accel).is_err(), "{accel:?} must be invalid");
        }
    }

    #[test]
    fn test_trigger_runs_callback_until_unregistered() {
        // Arrange
        let backend = InMemoryShortcutBackend::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        backend
            .register(
                "Ctrl+F1",
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        // Act
        let first = backend.trigger("Ctrl+F1");
        backend.unregister("Ctrl+F1");
        let second = backend.trigger("Ctrl+F1");

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reserved_accelerator_is_in_use() {
        let backend = InMemoryShortcutBackend::new();
        backend.reserve("Alt+Tab");

        let result = backend.register("Alt+Tab", Arc::new(|| {}));

        assert_eq!(result, Err(HotkeyError::InUse("Alt+Tab".to_string())));
    }
}
