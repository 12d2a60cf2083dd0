//! TCP connection to the satellite host.
//!
//! Architecture:
//! - [`ProtocolClient`] owns the socket.  Nothing else writes to it.
//! - `connect` performs the TCP connect plus the `BEGIN` handshake under a
//!   single timeout, then splits the stream:
//!   - a **writer task** owns the write half, drains an outbound `mpsc`
//!     channel and sends a keepalive `PING` every `ping_interval`;
//!   - a **reader task** decodes lines, answers `PING`, and publishes
//!     [`DeckEvent`]s in arrival order.
//! - Outbound calls (`add_device`, `key_down_xy`, ...) are synchronous: they
//!   push onto the channel if a session exists and are dropped otherwise.
//!
//! # Keepalive (for beginners)
//!
//! A TCP connection whose peer vanished (cable pulled, host suspended) can
//! look open for minutes.  The client therefore pings every couple of
//! seconds; the host answers with `PONG`.  If *no line at all* arrives for
//! `ping_timeout`, the reader gives up with [`ConnectError::TimedOut`].

pub mod mock;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use screendeck_core::protocol::messages::{
    api_major, command, AddDeviceMessage, KeyRef, KeyStateMessage, RotateDirection, SUPPORTED_API_MAJOR,
};
use screendeck_core::protocol::{decode_message, encode_message, frame_len, ProtocolError};
use screendeck_core::{
    ConnectError, DeckEvent, DeviceCapabilities, DeviceId, KeyState, SatelliteMessage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::application::events::{EventBus, Subscription};
use crate::application::link::SatelliteLink;
use crate::application::settings::TimingConfig;

const READ_CHUNK: usize = 64 * 1024;

/// Upper bound on flushing `QUIT` during a graceful disconnect.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_millis(250);

/// Timeouts for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolClientConfig {
    /// Budget for TCP connect plus `BEGIN`.
    pub handshake_timeout: Duration,
    pub ping_interval: Duration,
    /// Maximum silence from the host before the session is dropped.
    pub ping_timeout: Duration,
}

impl Default for ProtocolClientConfig {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for ProtocolClientConfig {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            handshake_timeout: timing.handshake_timeout(),
            ping_interval: timing.ping_interval(),
            ping_timeout: timing.ping_timeout(),
        }
    }
}

/// Why a session ended: `None` for an orderly `QUIT` from the host.
type CloseReason = Option<(ConnectError, String)>;

struct Session {
    generation: u64,
    outbound: mpsc::UnboundedSender<SatelliteMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Column count per registered device, for resolving `row/column` keys.
type ColumnMap = Arc<Mutex<HashMap<DeviceId, u32>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Production [`SatelliteLink`] over TCP.
pub struct ProtocolClient {
    config: ProtocolClientConfig,
    bus: EventBus<DeckEvent>,
    session: Arc<Mutex<Option<Session>>>,
    columns: ColumnMap,
    generations: AtomicU64,
}

impl ProtocolClient {
    pub fn new(config: ProtocolClientConfig) -> Self {
        Self {
            config,
            bus: EventBus::new(),
            session: Arc::new(Mutex::new(None)),
            columns: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    fn send(&self, msg: SatelliteMessage) {
        let session = lock(&self.session);
        match session.as_ref() {
            Some(s) => {
                trace!(command = msg.command(), "queueing frame");
                if s.outbound.send(msg).is_err() {
                    debug!("writer already stopped; frame dropped");
                }
            }
            None => debug!(command = msg.command(), "not connected; frame dropped"),
        }
    }

    fn report(&self, error: ConnectError, detail: String) -> ConnectError {
        warn!(code = error.code(), %detail, "connect failed");
        self.bus.publish(DeckEvent::Error {
            error: error.clone(),
            detail,
        });
        error
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

struct Handshake {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    /// Bytes received after `BEGIN`.
    leftover: Vec<u8>,
    companion_version: String,
    api_version: String,
}

async fn handshake(host: &str, port: u16) -> Result<Handshake, (ConnectError, String)> {
    let io_err = |e: std::io::Error| (ConnectError::classify(&e, host, port), e.to_string());

    let stream = TcpStream::connect((host, port)).await.map_err(io_err)?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not disable Nagle: {e}");
    }
    let (mut reader, writer) = stream.into_split();
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        loop {
            match decode_message(&buf) {
                Ok((
                    SatelliteMessage::Begin {
                        companion_version,
                        api_version,
                    },
                    consumed,
                )) => {
                    buf.drain(..consumed);
                    if api_major(&api_version) != Some(SUPPORTED_API_MAJOR) {
                        let detail = format!("unsupported api version {api_version}");
                        return Err((ConnectError::Unknown(detail.clone()), detail));
                    }
                    return Ok(Handshake {
                        reader,
                        writer,
                        leftover: buf,
                        companion_version,
                        api_version,
                    });
                }
                Ok((other, consumed)) => {
                    debug!(command = other.command(), "ignoring line before BEGIN");
                    buf.drain(..consumed);
                }
                Err(ProtocolError::InsufficientData { .. }) => break,
                Err(e) => match frame_len(&buf) {
                    Some(len) => {
                        warn!("skipping undecodable line during handshake: {e}");
                        buf.drain(..len);
                    }
                    None => return Err((ConnectError::Unknown(e.to_string()), e.to_string())),
                },
            }
        }

        let n = reader.read(&mut chunk).await.map_err(io_err)?;
        if n == 0 {
            return Err((
                ConnectError::ConnectionReset,
                "connection closed during handshake".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

// ── Writer task ───────────────────────────────────────────────────────────────

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<SatelliteMessage>,
    ping_interval: Duration,
    failed: oneshot::Sender<(ConnectError, String)>,
    peer: (String, u16),
) {
    let mut ticker = time::interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ping_seq: u64 = 0;

    loop {
        let msg = tokio::select! {
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = ticker.tick() => {
                ping_seq += 1;
                SatelliteMessage::Ping(ping_seq.to_string())
            }
        };

        let bytes = match encode_message(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(command = msg.command(), "failed to encode frame: {e}");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            error!("failed to send frame: {e}");
            let _ = failed.send((ConnectError::classify(&e, &peer.0, peer.1), e.to_string()));
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("socket shutdown: {e}");
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Everything the reader needs, owned by the reader task.
struct InboundDispatcher {
    bus: EventBus<DeckEvent>,
    columns: ColumnMap,
    /// Used to answer `PING`.
    outbound: mpsc::UnboundedSender<SatelliteMessage>,
    session: Arc<Mutex<Option<Session>>>,
    generation: u64,
    ping_timeout: Duration,
    peer: (String, u16),
}

impl InboundDispatcher {
    async fn run(
        self,
        mut reader: OwnedReadHalf,
        mut buf: Vec<u8>,
        mut writer_failed: oneshot::Receiver<(ConnectError, String)>,
        go: oneshot::Receiver<()>,
    ) {
        if go.await.is_err() {
            return;
        }
        let mut chunk = vec![0u8; READ_CHUNK];

        let reason: CloseReason = loop {
            if self.drain(&mut buf) {
                info!("host sent QUIT");
                break None;
            }
            tokio::select! {
                read = time::timeout(self.ping_timeout, reader.read(&mut chunk)) => match read {
                    Err(_) => break Some((
                        ConnectError::TimedOut,
                        format!("no data from host for {} ms", self.ping_timeout.as_millis()),
                    )),
                    Ok(Ok(0)) => break Some((
                        ConnectError::ConnectionReset,
                        "connection closed by host".to_string(),
                    )),
                    Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                    Ok(Err(e)) => break Some((
                        ConnectError::classify(&e, &self.peer.0, self.peer.1),
                        e.to_string(),
                    )),
                },
                failed = &mut writer_failed => break Some(failed.unwrap_or_else(|_| (
                    ConnectError::ConnectionReset,
                    "writer stopped".to_string(),
                ))),
            }
        };

        self.finish(reason);
    }

    /// Decodes and dispatches every complete line.  Returns `true` on `QUIT`.
    fn drain(&self, buf: &mut Vec<u8>) -> bool {
        loop {
            match decode_message(buf) {
                Ok((msg, consumed)) => {
                    buf.drain(..consumed);
                    if self.dispatch(msg) {
                        return true;
                    }
                }
                Err(ProtocolError::InsufficientData { .. }) => return false,
                Err(e) => match frame_len(buf) {
                    Some(len) => {
                        warn!("skipping undecodable line: {e}");
                        buf.drain(..len);
                    }
                    None => {
                        // Only LineTooLong lands here: discard what we have.
                        warn!("discarding oversized input: {e}");
                        buf.clear();
                        return false;
                    }
                },
            }
        }
    }

    fn dispatch(&self, msg: SatelliteMessage) -> bool {
        match msg {
            SatelliteMessage::Ping(payload) => {
                let _ = self.outbound.send(SatelliteMessage::Pong(payload));
            }
            SatelliteMessage::Pong(_) => trace!("pong"),
            SatelliteMessage::KeyState(state) => {
                if let Some(event) = self.draw_event(state) {
                    self.bus.publish(event);
                }
            }
            SatelliteMessage::KeysClear { device_id } => {
                self.bus.publish(DeckEvent::ClearDeck { device_id });
            }
            SatelliteMessage::Brightness { device_id, percent } => {
                self.bus.publish(DeckEvent::Brightness { device_id, percent });
            }
            SatelliteMessage::LockedState {
                device_id, locked, ..
            } => {
                self.bus.publish(DeckEvent::LockedState { device_id, locked });
            }
            SatelliteMessage::Ack(ack) if ack.command == command::ADD_DEVICE => {
                let Some(device_id) = ack.device_id else {
                    warn!(ok = ack.ok, "ADD-DEVICE acknowledgement without DEVICEID");
                    return false;
                };
                if ack.ok {
                    debug!(%device_id, "host accepted device");
                    self.bus.publish(DeckEvent::DeviceAdded { device_id });
                } else {
                    let message = ack.message.unwrap_or_default();
                    self.bus.publish(DeckEvent::DeviceRejected { device_id, message });
                }
            }
            SatelliteMessage::Ack(ack) if !ack.ok => {
                warn!(command = %ack.command, message = ?ack.message, "host rejected command");
            }
            SatelliteMessage::Error { message } => warn!("host reported error: {message}"),
            SatelliteMessage::Quit => return true,
            other => debug!(command = other.command(), "ignoring inbound message"),
        }
        false
    }

    fn draw_event(&self, msg: KeyStateMessage) -> Option<DeckEvent> {
        let key_index = match msg.key {
            KeyRef::Index(index) => index,
            KeyRef::Grid { .. } => {
                let columns = lock(&self.columns).get(&msg.device_id).copied();
                let Some(columns) = columns else {
                    warn!(device_id = %msg.device_id, key = %msg.key, "draw for unregistered device");
                    return None;
                };
                let Some(index) = msg.key.to_index(columns) else {
                    warn!(
                        device_id = %msg.device_id,
                        key = %msg.key,
                        columns,
                        "draw outside the grid"
                    );
                    return None;
                };
                index
            }
        };
        Some(DeckEvent::Draw {
            device_id: msg.device_id,
            key_index,
            state: KeyState {
                bitmap: msg.bitmap,
                color: msg.color,
                text: msg.text,
                text_color: msg.text_color,
                font_size: msg.font_size,
                ..KeyState::default()
            },
        })
    }

    fn finish(self, reason: CloseReason) {
        let owned = {
            let mut session = lock(&self.session);
            match session.as_ref() {
                Some(s) if s.generation == self.generation => session.take(),
                _ => None,
            }
        };
        // A newer session or a manual disconnect already took over.
        if owned.is_none() {
            return;
        }
        if let Some((error, detail)) = reason {
            warn!(code = error.code(), %detail, "connection to host lost");
            self.bus.publish(DeckEvent::Error { error, detail });
        }
        self.bus.publish(DeckEvent::Disconnected);
    }
}

// ── SatelliteLink impl ────────────────────────────────────────────────────────

#[async_trait]
impl SatelliteLink for ProtocolClient {
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.disconnect().await;
        info!(host, port, "connecting to host");

        let shake = match time::timeout(self.config.handshake_timeout, handshake(host, port)).await
        {
            Ok(Ok(shake)) => shake,
            Ok(Err((error, detail))) => return Err(self.report(error, detail)),
            Err(_) => {
                return Err(self.report(
                    ConnectError::TimedOut,
                    format!(
                        "handshake with {host}:{port} did not complete within {} ms",
                        self.config.handshake_timeout.as_millis()
                    ),
                ))
            }
        };
        info!(
            companion = %shake.companion_version,
            api = %shake.api_version,
            "handshake complete"
        );

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let peer = (host.to_string(), port);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (failed_tx, failed_rx) = oneshot::channel();
        let (go_tx, go_rx) = oneshot::channel();

        let writer = tokio::spawn(write_loop(
            shake.writer,
            outbound_rx,
            self.config.ping_interval,
            failed_tx,
            peer.clone(),
        ));
        let dispatcher = InboundDispatcher {
            bus: self.bus.clone(),
            columns: Arc::clone(&self.columns),
            outbound: outbound_tx.clone(),
            session: Arc::clone(&self.session),
            generation,
            ping_timeout: self.config.ping_timeout,
            peer,
        };
        let reader = tokio::spawn(dispatcher.run(shake.reader, shake.leftover, failed_rx, go_rx));

        *lock(&self.session) = Some(Session {
            generation,
            outbound: outbound_tx,
            reader,
            writer,
        });
        self.bus.publish(DeckEvent::Connected);
        let _ = go_tx.send(());
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(session) = lock(&self.session).take() else {
            return;
        };
        session.reader.abort();
        let _ = session.outbound.send(SatelliteMessage::Quit);
        drop(session.outbound);
        if time::timeout(WRITER_FLUSH_TIMEOUT, session.writer).await.is_err() {
            debug!("writer did not flush QUIT in time");
        }
        info!("disconnected from host");
        self.bus.publish(DeckEvent::Disconnected);
    }

    fn is_connected(&self) -> bool {
        lock(&self.session).is_some()
    }

    fn add_device(&self, id: &DeviceId, name: &str, capabilities: &DeviceCapabilities) {
        lock(&self.columns).insert(id.clone(), capabilities.column_count);
        self.send(SatelliteMessage::AddDevice(AddDeviceMessage {
            device_id: id.clone(),
            product_name: name.to_string(),
            capabilities: capabilities.clone(),
        }));
    }

    fn remove_device(&self, id: &DeviceId) {
        if lock(&self.columns).remove(id).is_none() {
            debug!(device_id = %id, "remove for unknown device ignored");
            return;
        }
        self.send(SatelliteMessage::RemoveDevice {
            device_id: id.clone(),
        });
    }

    fn key_down_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyPress {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            pressed: true,
        });
    }

    fn key_up_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyPress {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            pressed: false,
        });
    }

    fn rotate_left_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyRotate {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            direction: RotateDirection::Left,
        });
    }

    fn rotate_right_xy(&self, id: &DeviceId, x: u32, y: u32) {
        self.send(SatelliteMessage::KeyRotate {
            device_id: id.clone(),
            key: KeyRef::at(x, y),
            direction: RotateDirection::Right,
        });
    }

    fn subscribe(&self) -> Subscription<DeckEvent> {
        self.bus.subscribe()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
