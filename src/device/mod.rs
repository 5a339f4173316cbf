//! Remote device subsystem
//!
//! Receives gamepad frames over UDP and keeps a live, concurrently readable
//! state per device:
//!
//! 1. [`udp_gamepad`] - UDP listener and sparse state store per remote device
//! 2. [`registry`] - Device lookup and the change notification fabric
//!
//! # Architecture
//!
//! ```text
//! UDP ──► UdpGamepad (receive task) ──► merge under write lock
//!                                            │
//!                                            ▼
//!                              ChangeNotifier ──► callback / subscriptions
//!                                            │
//! Consumers ◄── DeviceRegistry::snapshot() ◄─┘ (re-read on demand)
//! ```

pub mod registry;
pub mod udp_gamepad;

pub use registry::{
    ChangeCallback, ChangeNotifier, ChangeSubscription, DeviceChanged, DeviceRegistry,
    GamepadHandle,
};
pub use udp_gamepad::{GamepadState, UdpGamepad, UdpGamepadSettings};

use crate::scaling::RawValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Capability set every registered device exposes
///
/// Reads are synchronous and must be cheap; consumers call them after a change
/// notification to pull the values they care about.
pub trait Gamepad: Send + Sync + fmt::Debug {
    /// Registry identifier of the device
    fn id(&self) -> &str;

    /// Display label
    fn name(&self) -> &str;

    /// Local instance id; remote devices have none and report `0`
    fn instance_id(&self) -> i32;

    fn axis_count(&self) -> usize;
    fn button_count(&self) -> usize;
    fn hat_count(&self) -> usize;

    /// Stored axis value, `0` if never observed
    fn axis(&self, index: usize) -> RawValue;

    /// Stored button value, `0` if never observed
    fn button(&self, index: usize) -> RawValue;

    /// Hat direction expanded into the canonical raw range
    fn hat(&self, index: usize) -> RawValue;

    /// Signals the device to stop receiving; safe to call more than once
    fn close(&self);

    /// Shape description of the device
    fn info(&self) -> GamepadInfo {
        GamepadInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            axes: self.axis_count(),
            buttons: self.button_count(),
            hats: self.hat_count(),
        }
    }
}

/// Serializable device description (`{id, name, axes, buttons, hats}`)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GamepadInfo {
    pub id: String,
    pub name: String,
    pub axes: usize,
    pub buttons: usize,
    pub hats: usize,
}

impl fmt::Display for GamepadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} axes, {} buttons, {} hats",
            self.name, self.id, self.axes, self.buttons, self.hats
        )
    }
}

/// Errors raised by device construction
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The bind address could not be resolved or the socket could not be bound
    ///
    /// Fatal to construction; nothing was spawned.
    #[error("Failed to bind UDP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// Critical sections never leave state half-written, so a poisoned lock still
// guards consistent data.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
