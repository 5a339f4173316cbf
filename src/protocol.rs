//! Wire format for gamepad frames
//!
//! A frame is one UDP datagram carrying a JSON object:
//!
//! ```text
//! { "axes": {"<int>": <int>, ...}, "buttons": {"<int>": <int>, ...}, "hats": {"<int>": <int>, ...} }
//! ```
//!
//! All three fields are optional; an absent (or `null`) field carries no updates
//! for that category. Axis and button values are [`RawValue`]s in the canonical
//! range, hat values are tri-state (`-1`, `0`, `1`).
//!
//! Decoding happens in two steps: the JSON document must parse as a whole,
//! otherwise the datagram is rejected with [`DecodeError::InvalidJson`]. Index
//! keys are then parsed one by one; a key that is not a non-negative integer is
//! reported in [`DecodedFrame::rejected`] and skipped, the remaining keys of
//! the same field still apply.

use crate::scaling::RawValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Serialized form of a frame as it travels over UDP.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WirePacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<BTreeMap<String, RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<BTreeMap<String, RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hats: Option<BTreeMap<String, RawValue>>,
}

impl WirePacket {
    /// Builds a full frame from dense per-category value lists.
    pub fn from_dense(axes: &[RawValue], buttons: &[RawValue], hats: &[RawValue]) -> Self {
        Self {
            axes: Some(dense_to_map(axes)),
            buttons: Some(dense_to_map(buttons)),
            hats: Some(dense_to_map(hats)),
        }
    }

    /// Serializes the packet into a datagram payload.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn dense_to_map(values: &[RawValue]) -> BTreeMap<String, RawValue> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| (index.to_string(), *value))
        .collect()
}

/// Input category of an indexed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputCategory {
    Axis,
    Button,
    Hat,
}

impl fmt::Display for InputCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputCategory::Axis => write!(f, "axes"),
            InputCategory::Button => write!(f, "buttons"),
            InputCategory::Hat => write!(f, "hats"),
        }
    }
}

/// Errors raised while decoding a datagram
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a JSON object of the expected shape
    #[error("Invalid frame payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A single index key could not be parsed and was skipped
    #[error("Invalid {category} index key: {key:?}")]
    InvalidIndex { category: InputCategory, key: String },
}

/// A frame with parsed indices, ready to be merged into device state.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    pub axes: Vec<(usize, RawValue)>,
    pub buttons: Vec<(usize, RawValue)>,
    /// Hat values normalized to their sign.
    pub hats: Vec<(usize, RawValue)>,
    /// Keys that were skipped because they are not valid indices.
    pub rejected: Vec<DecodeError>,
}

impl DecodedFrame {
    /// Number of index/value pairs that will be applied.
    pub fn len(&self) -> usize {
        self.axes.len() + self.buttons.len() + self.hats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes a datagram payload into a [`DecodedFrame`].
pub fn decode(payload: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let packet: WirePacket = serde_json::from_slice(payload)?;
    Ok(DecodedFrame::from(packet))
}

impl From<WirePacket> for DecodedFrame {
    fn from(packet: WirePacket) -> Self {
        let mut rejected = Vec::new();
        let axes = parse_field(InputCategory::Axis, packet.axes, &mut rejected);
        let buttons = parse_field(InputCategory::Button, packet.buttons, &mut rejected);
        let hats = parse_field(InputCategory::Hat, packet.hats, &mut rejected)
            .into_iter()
            .map(|(index, value)| (index, value.signum()))
            .collect();

        Self {
            axes,
            buttons,
            hats,
            rejected,
        }
    }
}

fn parse_field(
    category: InputCategory,
    field: Option<BTreeMap<String, RawValue>>,
    rejected: &mut Vec<DecodeError>,
) -> Vec<(usize, RawValue)> {
    let Some(entries) = field else {
        return Vec::new();
    };

    let mut parsed = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match key.trim().parse::<usize>() {
            Ok(index) => parsed.push((index, value)),
            Err(_) => rejected.push(DecodeError::InvalidIndex { category, key }),
        }
    }
    parsed
}
