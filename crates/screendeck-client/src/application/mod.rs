//! Application layer: the use cases of the satellite client.
//!
//! Nothing in here opens a socket or touches the file system.  The network
//! and storage sit behind the [`link::SatelliteLink`] and
//! [`settings::ConfigStore`] traits, which the infrastructure layer
//! implements.
//!
//! # Sub-modules
//!
//! - **`link`**            – The seam to the protocol client.
//! - **`events`**          – Publish/subscribe fan-out of events.
//! - **`scheduler`**       – Cancellable delayed tasks.
//! - **`settings`**        – The persisted configuration record.
//! - **`key_state_cache`** – Last known look of every key.
//! - **`draw_queue`**      – Strictly ordered dispatch of render events.
//! - **`device_registry`** – Which devices the host knows, and re-registration
//!   on shape changes.
//! - **`hotkeys`**         – Global accelerators bound to keys.
//! - **`reconnect`**       – Connection state machine with fixed backoff.
//! - **`service`**         – Glues the above together behind one facade.

pub mod device_registry;
pub mod draw_queue;
pub mod events;
pub mod hotkeys;
pub mod key_state_cache;
pub mod link;
pub mod reconnect;
pub mod scheduler;
pub mod service;
pub mod settings;
