//! ScreenDeck satellite client entry point.
//!
//! Loads the configuration, wires the TCP client, the shortcut backend and
//! the [`DeckService`] together, then runs until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! screendeck-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>  Config file [env: SCREENDECK_CONFIG]
//!   --host <HOST>    Companion host, overrides the config [env: SCREENDECK_HOST]
//!   --port <PORT>    Companion satellite port [env: SCREENDECK_PORT]
//! ```
//!
//! Every line typed on stdin is treated as an accelerator (`Ctrl+Alt+F1`) and
//! triggers the hotkey bound to it, which taps the bound key.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use screendeck_core::DeckEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use screendeck_client::application::hotkeys::ShortcutBackend;
use screendeck_client::application::link::SatelliteLink;
use screendeck_client::application::scheduler::Scheduler;
use screendeck_client::application::service::{DeckContext, DeckService};
use screendeck_client::application::settings::ConfigStore;
use screendeck_client::infrastructure::network::{ProtocolClient, ProtocolClientConfig};
use screendeck_client::infrastructure::shortcuts::InMemoryShortcutBackend;
use screendeck_client::infrastructure::storage::config::FileConfigStore;

/// Grace period for a clean shutdown before the process exits anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "screendeck-client",
    about = "Companion satellite client for ScreenDeck virtual control surfaces",
    version
)]
struct Cli {
    /// Path to `config.toml`.  Defaults to the platform config directory.
    #[arg(long, env = "SCREENDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Companion host name or IP address.
    #[arg(long, env = "SCREENDECK_HOST")]
    host: Option<String>,

    /// Companion satellite API port.
    #[arg(long, env = "SCREENDECK_PORT")]
    port: Option<u16>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = match cli.config {
        Some(path) => FileConfigStore::at(path),
        None => FileConfigStore::default_location()
            .context("cannot locate the config directory; pass --config")?,
    };
    let mut config = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(config = %store.path().display(), "ScreenDeck client starting");

    if let Some(id) = config.seed_default_device() {
        info!(device_id = %id, "first run: created default device");
        if let Err(e) = store.save(&config) {
            warn!("failed to save configuration: {e}");
        }
    }
    if let Some(host) = cli.host {
        config.host.address = host;
    }
    if let Some(port) = cli.port {
        config.host.port = port;
    }
    let retry_delay = config.timing.retry_delay();

    // ── Wiring ────────────────────────────────────────────────────────────────
    let link = Arc::new(ProtocolClient::new(ProtocolClientConfig::from(&config.timing)));
    let shortcuts = Arc::new(InMemoryShortcutBackend::new());
    let service = DeckService::new(DeckContext {
        link: link as Arc<dyn SatelliteLink>,
        shortcuts: Arc::clone(&shortcuts) as Arc<dyn ShortcutBackend>,
        store: Arc::new(store) as Arc<dyn ConfigStore>,
        scheduler: Scheduler::current(),
        config,
    });

    let mut events = service.subscribe();
    let mut states = service.subscribe_state();
    service.start();

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            Some(event) = events.recv() => log_event(&event, retry_delay),
            Some(state) = states.recv() => info!(?state, "connection state changed"),
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let accelerator = line.trim();
                    if !accelerator.is_empty() && !shortcuts.trigger(accelerator) {
                        warn!(accelerator, "no hotkey bound");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, service.shutdown())
        .await
        .is_err()
    {
        warn!("shutdown did not finish in time");
    }
    info!("ScreenDeck client stopped");
    // The stdin reader blocks a runtime thread; exit without waiting for it.
    std::process::exit(0);
}

fn log_event(event: &DeckEvent, retry_delay: Duration) {
    match event {
        DeckEvent::Connected => info!("connected to Companion"),
        DeckEvent::Disconnected => info!("disconnected from Companion"),
        DeckEvent::Error { error, .. } => warn!("{}", error.user_message(retry_delay)),
        DeckEvent::DeviceAdded { device_id } => info!(%device_id, "device registered"),
        DeckEvent::DeviceRejected { device_id, message } => {
            warn!(%device_id, %message, "device rejected by Companion")
        }
        DeckEvent::Brightness { device_id, percent } => {
            debug!(%device_id, percent, "brightness")
        }
        DeckEvent::LockedState { device_id, locked } => {
            info!(%device_id, locked, "lock state changed")
        }
        DeckEvent::ClearDeck { device_id } => debug!(%device_id, "deck cleared"),
        DeckEvent::Draw {
            device_id,
            key_index,
            ..
        } => debug!(%device_id, key_index, "key drawn"),
    }
}
