//! Infrastructure layer: adapters to the outside world.
//!
//! - `network`   – the TCP satellite client and a recording mock link.
//! - `shortcuts` – accelerator validation and the in-process shortcut backend.
//! - `storage`   – TOML configuration persistence.

pub mod network;
pub mod shortcuts;
pub mod storage;
