use super::PublisherError;
use crate::protocol::WirePacket;
use crate::scaling::{from_unit, RawValue};
use gilrs::{Axis, Button, Gilrs};
use std::fmt;
use tracing::{debug, error, info};

// Standard gilrs axes, sent in this index order
const AXES: [Axis; 6] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::LeftZ,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::RightZ,
];

// Standard gilrs buttons, sent in this index order
const BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::LeftTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

/// Enumerated local input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
}

/// One dense sample of a local device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub axes: Vec<RawValue>,
    pub buttons: Vec<RawValue>,
    /// Tri-state hat directions
    pub hats: Vec<RawValue>,
}

impl InputFrame {
    pub fn to_packet(&self) -> WirePacket {
        WirePacket::from_dense(&self.axes, &self.buttons, &self.hats)
    }
}

/// Local input API the publisher samples
pub trait InputSource: fmt::Debug {
    /// Currently available devices
    fn devices(&mut self) -> Vec<DeviceDescriptor>;

    /// Current values of the device at `index`
    fn sample(&mut self, index: usize) -> Result<InputFrame, PublisherError>;
}

/// [`InputSource`] over gilrs
///
/// Axes are the six standard gilrs axes scaled into the raw range. Buttons are
/// `1` while pressed and `0` otherwise. Hat 0 is the d-pad's vertical
/// direction: up `1`, down `-1`, neither `0`.
#[derive(Debug)]
pub struct GilrsSource {
    gilrs: Gilrs,
}

impl GilrsSource {
    pub fn new() -> Result<Self, PublisherError> {
        info!("Initializing gilrs controller interface");
        match Gilrs::new() {
            Ok(gilrs) => {
                info!("Successfully initialized gilrs");
                Ok(Self { gilrs })
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                Err(PublisherError::InitializationError(e.to_string()))
            }
        }
    }

    // Drains pending events so cached gamepad state is current
    fn pump_events(&mut self) {
        while let Some(event) = self.gilrs.next_event() {
            debug!("Pumped gilrs event: {:?}", event.event);
        }
    }
}

impl InputSource for GilrsSource {
    fn devices(&mut self) -> Vec<DeviceDescriptor> {
        self.pump_events();
        self.gilrs
            .gamepads()
            .enumerate()
            .map(|(index, (_id, gamepad))| DeviceDescriptor {
                index,
                name: gamepad.name().to_string(),
            })
            .collect()
    }

    fn sample(&mut self, index: usize) -> Result<InputFrame, PublisherError> {
        self.pump_events();
        let (_id, gamepad) = self
            .gilrs
            .gamepads()
            .nth(index)
            .ok_or(PublisherError::DeviceUnavailable(index))?;

        let axes = AXES
            .iter()
            .map(|axis| from_unit(gamepad.value(*axis)))
            .collect();
        let buttons = BUTTONS
            .iter()
            .map(|button| RawValue::from(gamepad.is_pressed(*button)))
            .collect();
        let hat = if gamepad.is_pressed(Button::DPadUp) {
            1
        } else if gamepad.is_pressed(Button::DPadDown) {
            -1
        } else {
            0
        };

        Ok(InputFrame {
            axes,
            buttons,
            hats: vec![hat],
        })
    }
}
