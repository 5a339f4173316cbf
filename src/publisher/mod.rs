//! Publisher subsystem - local joystick to UDP
//!
//! Samples a local input device on a fixed cadence and sends every sample as a
//! full JSON frame:
//!
//! 1. [`source`] - Input source boundary and the gilrs-backed implementation
//! 2. [`forwarder`] - Connection setup and the sampling loop
//!
//! # Architecture
//!
//! ```text
//! InputSource ──► InputFrame ──► WirePacket (JSON) ──► UDP
//!   (sample)        (dense)        (string keys)
//! ```

pub mod forwarder;
pub mod source;

pub use forwarder::{Forwarding, Idle, Publisher, PublisherSettings, PublisherState};
pub use source::{DeviceDescriptor, GilrsSource, InputFrame, InputSource};

/// Errors raised on the sending side
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Failed to initialize input source: {0}")]
    InitializationError(String),

    #[error("No joysticks found")]
    NoDevices,

    #[error("Joystick index out of range: {index} (found {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Joystick {0} is no longer available")]
    DeviceUnavailable(usize),

    #[error("Could not resolve target address: {0}")]
    Resolve(String),

    #[error("Publisher is not connected")]
    NotConnected,

    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
