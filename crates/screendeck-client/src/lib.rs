//! screendeck-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the client do? (for beginners)
//!
//! ScreenDeck shows virtual macro pads on screen.  Bitfocus Companion (the
//! *host*) decides what every key looks like and what pressing it does; it
//! speaks the line-based "satellite" protocol over TCP.
//!
//! The client:
//!
//! 1. Connects to the host and waits for its `BEGIN` greeting, retrying
//!    forever with a fixed backoff while the host is unreachable.
//! 2. Registers every configured device (`ADD-DEVICE`) with its grid shape.
//! 3. Caches the key visuals the host sends (`KEY-STATE`) and hands them to
//!    whatever renders the panels, strictly in arrival order.
//! 4. Reports presses, releases and encoder rotations back to the host,
//!    including taps triggered by global hotkeys.

/// Application layer: use cases and the seams they depend on.
pub mod application;

/// Infrastructure layer: TCP client, shortcut backend and config storage.
pub mod infrastructure;
