//! Domain entities for ScreenDeck.
//!
//! Nothing in here touches the network or the operating system, so every type
//! can be unit-tested in isolation and shared by the protocol codec and the
//! client application alike.

/// Device identity, capability descriptors and the key coordinate system.
pub mod device;

/// Events raised to consumers, the classified error taxonomy and connection states.
pub mod events;

/// Last-known visual state of a single key.
pub mod key_state;
