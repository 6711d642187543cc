//! Normalized input events
//!
//! Identifiers mirror the Linux input event codes so a host can forward
//! them to an evdev/uinput device without another lookup table.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Button identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Button {
    Trigger,
    Thumb,
    Thumb2,
    Base,
    A,
    B,
    C,
    X,
    Y,
    Z,
    Tl,
    Tr,
    Mode,
    GearDown,
    GearUp,
    TriggerHappy1,
    TriggerHappy2,
    TriggerHappy3,
    TriggerHappy4,
    TriggerHappy5,
    TriggerHappy6,
    TriggerHappy7,
    TriggerHappy8,
}

impl Button {
    /// Linux `BTN_*` code
    pub fn code(self) -> u16 {
        match self {
            Button::Trigger => 0x120,
            Button::Thumb => 0x121,
            Button::Thumb2 => 0x122,
            Button::Base => 0x126,
            Button::A => 0x130,
            Button::B => 0x131,
            Button::C => 0x132,
            Button::X => 0x133,
            Button::Y => 0x134,
            Button::Z => 0x135,
            Button::Tl => 0x136,
            Button::Tr => 0x137,
            Button::Mode => 0x13c,
            Button::GearDown => 0x150,
            Button::GearUp => 0x151,
            Button::TriggerHappy1 => 0x2c0,
            Button::TriggerHappy2 => 0x2c1,
            Button::TriggerHappy3 => 0x2c2,
            Button::TriggerHappy4 => 0x2c3,
            Button::TriggerHappy5 => 0x2c4,
            Button::TriggerHappy6 => 0x2c5,
            Button::TriggerHappy7 => 0x2c6,
            Button::TriggerHappy8 => 0x2c7,
        }
    }
}

/// Absolute axis identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    Throttle,
    Rudder,
    TiltX,
    TiltY,
}

impl Axis {
    /// Linux `ABS_*` code
    pub fn code(self) -> u16 {
        match self {
            Axis::X => 0x00,
            Axis::Y => 0x01,
            Axis::Z => 0x02,
            Axis::Rx => 0x03,
            Axis::Ry => 0x04,
            Axis::Rz => 0x05,
            Axis::Throttle => 0x06,
            Axis::Rudder => 0x07,
            Axis::TiltX => 0x1a,
            Axis::TiltY => 0x1b,
        }
    }

    /// Value range a host should register for this axis
    pub fn range(self) -> RangeInclusive<i32> {
        match self {
            Axis::Z | Axis::Rz | Axis::TiltX | Axis::TiltY => 0..=3,
            _ => 0..=255,
        }
    }
}

/// One button or axis change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: i32 },
}

/// All events produced by one transfer completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Sequence number assigned at flush; a gap means frames were dropped
    pub seq: u64,
    /// Microseconds since the Unix epoch at flush time
    pub timestamp_us: u64,
    pub events: Vec<InputEvent>,
}
