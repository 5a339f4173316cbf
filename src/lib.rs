//! Gamepad bridge
//!
//! Forwards a local joystick over UDP as JSON frames, and on the receiving
//! side keeps a live, concurrently readable state per remote device:
//!
//! ```text
//! Joystick ──► Publisher ──UDP/JSON──► UdpGamepad ──► DeviceRegistry ──► consumers
//!              (sampling)              (merge)        (lookup + change signals)
//! ```

pub mod config;
pub mod device;
pub mod listener;
pub mod protocol;
pub mod publisher;
pub mod scaling;

pub use device::{
    ChangeSubscription, DeviceChanged, DeviceError, DeviceRegistry, Gamepad, GamepadInfo,
    UdpGamepad, UdpGamepadSettings,
};
pub use scaling::{map_range, RawValue, MAX_RAW, MIN_RAW};
