//! UDP gamepad - remote device state fed by JSON frames
//!
//! Each [`UdpGamepad`] owns one UDP socket and one receive task. The task
//! decodes every datagram into a [`DecodedFrame`], merges it into the sparse
//! [`GamepadState`] under a single write lock, then signals the registry's
//! [`ChangeNotifier`] once per merged packet.
//!
//! # Merge semantics
//!
//! - Last value wins per index; indices absent from a packet keep their value.
//! - Per-category counts are high-water marks of `index + 1` and never shrink.
//! - Indices are never removed. A sender can grow the maps without bound; the
//!   protocol is cooperative and this is accepted.
//!
//! # Lifecycle
//!
//! ```text
//! open() ──► bound socket + spawned receive task
//!              │
//!              ├─ deadline expiry ──► loop (not an error)
//!              ├─ malformed packet ──► warn, discard, loop
//!              └─ valid packet ──► merge ──► notify ──► loop
//!
//! close() ──► cancel token ──► task exits, socket released
//! shutdown() ──► close() + join the task
//! ```

use super::{read_lock, write_lock, ChangeNotifier, DeviceError, Gamepad};
use crate::protocol::{self, DecodedFrame};
use crate::scaling::{expand_hat, RawValue};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receive settings for a UDP gamepad
#[derive(Clone, Debug)]
pub struct UdpGamepadSettings {
    /// Upper bound for a single receive attempt in milliseconds
    ///
    /// Expiry is silent and only bounds how long the task waits between
    /// checks of its cancellation token.
    pub read_timeout_ms: u64,

    /// Receive buffer size in bytes; longer datagrams are truncated and fail to decode
    pub recv_buffer_size: usize,
}

impl Default for UdpGamepadSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: 500,
            // Largest IPv4 UDP payload
            recv_buffer_size: 65_507,
        }
    }
}

/// Sparse axis/button/hat values of one remote device
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GamepadState {
    axes: BTreeMap<usize, RawValue>,
    buttons: BTreeMap<usize, RawValue>,
    hats: BTreeMap<usize, RawValue>,
    axes_count: usize,
    buttons_count: usize,
    hats_count: usize,
    last_update: Option<DateTime<Local>>,
}

impl GamepadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every index/value pair of `frame` and stamps `now`
    pub fn merge(&mut self, frame: &DecodedFrame, now: DateTime<Local>) {
        merge_category(&mut self.axes, &mut self.axes_count, &frame.axes);
        merge_category(&mut self.buttons, &mut self.buttons_count, &frame.buttons);
        merge_category(&mut self.hats, &mut self.hats_count, &frame.hats);
        self.last_update = Some(now);
    }

    pub fn axis(&self, index: usize) -> RawValue {
        self.axes.get(&index).copied().unwrap_or(0)
    }

    pub fn button(&self, index: usize) -> RawValue {
        self.buttons.get(&index).copied().unwrap_or(0)
    }

    /// Hat direction expanded into the canonical range; absent reads as `0`
    pub fn hat(&self, index: usize) -> RawValue {
        self.hats.get(&index).copied().map(expand_hat).unwrap_or(0)
    }

    /// Stored tri-state hat direction
    pub fn hat_direction(&self, index: usize) -> RawValue {
        self.hats.get(&index).copied().unwrap_or(0)
    }

    pub fn axis_count(&self) -> usize {
        self.axes_count
    }

    pub fn button_count(&self) -> usize {
        self.buttons_count
    }

    pub fn hat_count(&self) -> usize {
        self.hats_count
    }

    /// Time of the last merged packet
    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    /// Stored axis values in index order
    pub fn axis_entries(&self) -> impl Iterator<Item = (usize, RawValue)> + '_ {
        self.axes.iter().map(|(&index, &value)| (index, value))
    }

    /// Stored button values in index order
    pub fn button_entries(&self) -> impl Iterator<Item = (usize, RawValue)> + '_ {
        self.buttons.iter().map(|(&index, &value)| (index, value))
    }

    /// Stored hats in index order, expanded like [`hat`](Self::hat)
    pub fn hat_entries(&self) -> impl Iterator<Item = (usize, RawValue)> + '_ {
        self.hats
            .iter()
            .map(|(&index, &value)| (index, expand_hat(value)))
    }
}

/// Lists only the values actually received; counts may be far larger
impl fmt::Display for GamepadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axes=")?;
        f.debug_map().entries(self.axis_entries()).finish()?;
        write!(f, " buttons=")?;
        f.debug_map().entries(self.button_entries()).finish()?;
        write!(f, " hats=")?;
        f.debug_map().entries(self.hat_entries()).finish()
    }
}

fn merge_category(
    values: &mut BTreeMap<usize, RawValue>,
    count: &mut usize,
    updates: &[(usize, RawValue)],
) {
    for &(index, value) in updates {
        values.insert(index, value);
        *count = (*count).max(index.saturating_add(1));
    }
}

/// Remote gamepad receiving JSON frames on a UDP socket
#[derive(Debug)]
pub struct UdpGamepad {
    id: String,
    name: String,
    local_addr: SocketAddr,
    state: Arc<RwLock<GamepadState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpGamepad {
    /// Binds `bind_addr` and starts the receive task
    ///
    /// Port `0` binds an ephemeral port; [`local_addr`](Self::local_addr)
    /// reports the one chosen.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Bind`] if the address cannot be resolved or bound.
    pub async fn open(
        id: impl Into<String>,
        name: impl Into<String>,
        bind_addr: &str,
        settings: Option<UdpGamepadSettings>,
        notifier: ChangeNotifier,
    ) -> Result<Self, DeviceError> {
        let id = id.into();
        let name = name.into();
        let settings = settings.unwrap_or_default();
        debug!(
            "Opening UDP gamepad {} ({}) on {} with settings: {:?}",
            name, id, bind_addr, settings
        );

        let bind_error = |source| DeviceError::Bind {
            addr: bind_addr.to_string(),
            source,
        };
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                error!("Failed to listen on UDP {}: {}", bind_addr, e);
                return Err(bind_error(e));
            }
        };
        let local_addr = socket.local_addr().map_err(bind_error)?;

        let state = Arc::new(RwLock::new(GamepadState::new()));
        let cancel = CancellationToken::new();
        let receiver = ReceiveLoop {
            device_id: id.clone(),
            socket,
            state: state.clone(),
            notifier,
            cancel: cancel.clone(),
            settings,
        };
        let task = tokio::spawn(receiver.run());

        info!("UDP gamepad {} ({}) listening on {}", name, id, local_addr);
        Ok(Self {
            id,
            name,
            local_addr,
            state,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Consistent copy of the whole device state
    pub fn snapshot(&self) -> GamepadState {
        read_lock(&self.state).clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        read_lock(&self.state).last_update()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Closes the device and waits for the receive task to finish
    pub async fn shutdown(&self) {
        self.close();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match task {
            Some(task) => match task.await {
                Ok(()) => debug!("Receive task joined: {}", self.id),
                Err(e) => error!("Receive task for {} panicked: {}", self.id, e),
            },
            None => debug!("Receive task already joined: {}", self.id),
        }
    }
}

impl Gamepad for UdpGamepad {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instance_id(&self) -> i32 {
        0
    }

    fn axis_count(&self) -> usize {
        read_lock(&self.state).axis_count()
    }

    fn button_count(&self) -> usize {
        read_lock(&self.state).button_count()
    }

    fn hat_count(&self) -> usize {
        read_lock(&self.state).hat_count()
    }

    fn axis(&self, index: usize) -> RawValue {
        read_lock(&self.state).axis(index)
    }

    fn button(&self, index: usize) -> RawValue {
        read_lock(&self.state).button(index)
    }

    fn hat(&self, index: usize) -> RawValue {
        read_lock(&self.state).hat(index)
    }

    fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!("Closing UDP gamepad {} on {}", self.id, self.local_addr);
            self.cancel.cancel();
        }
    }
}

impl Drop for UdpGamepad {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ReceiveLoop {
    device_id: String,
    socket: UdpSocket,
    state: Arc<RwLock<GamepadState>>,
    notifier: ChangeNotifier,
    cancel: CancellationToken,
    settings: UdpGamepadSettings,
}

impl ReceiveLoop {
    async fn run(self) {
        debug!("Receive loop started for {}", self.device_id);
        let mut buffer = vec![0u8; self.settings.recv_buffer_size.max(1)];
        let deadline = Duration::from_millis(self.settings.read_timeout_ms.max(1));
        let mut merged: u64 = 0;
        let mut discarded: u64 = 0;

        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = timeout(deadline, self.socket.recv_from(&mut buffer)) => received,
            };

            let (len, peer) = match received {
                // Deadline expired, check for cancellation again
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!("UDP[{}] read error: {}", self.device_id, e);
                    continue;
                }
                Ok(Ok(datagram)) => datagram,
            };

            let frame = match protocol::decode(&buffer[..len]) {
                Ok(frame) => frame,
                Err(e) => {
                    discarded += 1;
                    warn!("UDP[{}] from {} discarded: {}", self.device_id, peer, e);
                    continue;
                }
            };
            for rejected in &frame.rejected {
                warn!("UDP[{}] from {}: {}", self.device_id, peer, rejected);
            }

            write_lock(&self.state).merge(&frame, Local::now());
            merged += 1;
            debug!(
                "UDP[{}] merged {} values from {}",
                self.device_id,
                frame.len(),
                peer
            );

            self.notifier.notify(&self.device_id);
        }

        info!(
            "Receive loop stopped for {} ({} merged, {} discarded)",
            self.device_id, merged, discarded
        );
    }
}
