//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the TOML configuration record
//! from the platform config directory, falling back to defaults on first run.

pub mod config;
