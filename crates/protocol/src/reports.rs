//! Fixed-layout report decoders
//!
//! The flightstick answers on three channels, each with a fixed layout:
//!
//! ```text
//! interrupt IN (8 bytes)
//!   [0] X  [1] Y  [2] rudder  [3] RX  [4] RY  [5] throttle  [6] A  [7] B
//!
//! vendor request 0x00 (2 bytes, LSB first, active-low)
//!   byte 0: fire-c  D  hat-press  ST  pad1-top  pad1-right  pad1-bottom  pad1-left
//!   byte 1: -  -  -  -  -  launch  trigger  -
//!
//! vendor request 0x01 (2 bytes, LSB first, active-low)
//!   byte 0: -  -  -  -  pad3-right  pad3-middle  pad3-left  -
//!   byte 1: mode(2 bits)  -  sw-1  pad2-top  pad2-right  pad2-bottom  pad2-left
//! ```
//!
//! Every decoded flag is the logical "pressed" state; the active-low inversion
//! happens here and nowhere else.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Interrupt report length
pub const INTERRUPT_REPORT_LEN: usize = 8;

/// Poll A response length
pub const POLL_A_REPORT_LEN: usize = 2;

/// Poll B response length
pub const POLL_B_REPORT_LEN: usize = 2;

/// Raw buttons report "pressed" below this value
pub const BUTTON_THRESHOLD: u8 = 0xC0;

/// Test bit `bit` of `byte`, inverting the active-low wire level
#[inline]
fn active_low(byte: u8, bit: u8) -> bool {
    (byte >> bit) & 1 == 0
}

fn check_len<'a, const N: usize>(report: &'static str, data: &'a [u8]) -> Result<&'a [u8; N]> {
    data.try_into().map_err(|_| ProtocolError::LengthMismatch {
        report,
        expected: N,
        actual: data.len(),
    })
}

/// A four-way directional pad
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pad {
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
    pub left: bool,
}

/// Collapse two opposite pad edges into a ternary axis value
///
/// The low edge wins when both read active.
pub fn ternary(low: bool, high: bool) -> u8 {
    if low {
        0
    } else if high {
        2
    } else {
        1
    }
}

impl Pad {
    /// Horizontal position: left = 0, center = 1, right = 2
    pub fn horizontal(&self) -> u8 {
        ternary(self.left, self.right)
    }

    /// Vertical position: top = 0, center = 1, bottom = 2
    pub fn vertical(&self) -> u8 {
        ternary(self.top, self.bottom)
    }
}

/// Report delivered on the interrupt IN endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterruptReport {
    pub x: u8,
    pub y: u8,
    pub rudder: u8,
    pub rx: u8,
    pub ry: u8,
    pub throttle: u8,
    pub button_a: bool,
    pub button_b: bool,
}

impl InterruptReport {
    pub fn from_bytes(raw: &[u8; INTERRUPT_REPORT_LEN]) -> Self {
        Self {
            x: raw[0],
            y: raw[1],
            rudder: raw[2],
            rx: raw[3],
            ry: raw[4],
            throttle: raw[5],
            button_a: raw[6] < BUTTON_THRESHOLD,
            button_b: raw[7] < BUTTON_THRESHOLD,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len::<INTERRUPT_REPORT_LEN>("interrupt", data).map(Self::from_bytes)
    }

    /// Axis values in wire order
    pub fn axes(&self) -> [u8; 6] {
        [self.x, self.y, self.rudder, self.rx, self.ry, self.throttle]
    }
}

/// Response to vendor request 0x00
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PollAReport {
    pub fire_c: bool,
    pub button_d: bool,
    pub hat_press: bool,
    pub button_st: bool,
    pub pad1: Pad,
    pub launch: bool,
    pub trigger: bool,
}

impl PollAReport {
    pub fn from_bytes(raw: &[u8; POLL_A_REPORT_LEN]) -> Self {
        let [b0, b1] = *raw;
        Self {
            fire_c: active_low(b0, 0),
            button_d: active_low(b0, 1),
            hat_press: active_low(b0, 2),
            button_st: active_low(b0, 3),
            pad1: Pad {
                top: active_low(b0, 4),
                right: active_low(b0, 5),
                bottom: active_low(b0, 6),
                left: active_low(b0, 7),
            },
            launch: active_low(b1, 5),
            trigger: active_low(b1, 6),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len::<POLL_A_REPORT_LEN>("poll-a", data).map(Self::from_bytes)
    }
}

/// Position of the three-way mode selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeSelect {
    /// Selector reads 0, between detents
    #[default]
    None,
    M1,
    M2,
    M3,
}

impl ModeSelect {
    /// Decode the 2-bit wire value (M1 - M2 - M3 read as 2 - 1 - 3)
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => ModeSelect::M2,
            2 => ModeSelect::M1,
            3 => ModeSelect::M3,
            _ => ModeSelect::None,
        }
    }
}

/// Response to vendor request 0x01
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PollBReport {
    pub pad3_right: bool,
    pub pad3_middle: bool,
    pub pad3_left: bool,
    pub button_sw1: bool,
    /// Not active-low, carried as-is
    pub mode: ModeSelect,
    pub pad2: Pad,
}

impl PollBReport {
    pub fn from_bytes(raw: &[u8; POLL_B_REPORT_LEN]) -> Self {
        let [b0, b1] = *raw;
        Self {
            pad3_right: active_low(b0, 4),
            pad3_middle: active_low(b0, 5),
            pad3_left: active_low(b0, 6),
            button_sw1: active_low(b1, 3),
            mode: ModeSelect::from_bits(b1),
            pad2: Pad {
                top: active_low(b1, 4),
                right: active_low(b1, 5),
                bottom: active_low(b1, 6),
                left: active_low(b1, 7),
            },
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len::<POLL_B_REPORT_LEN>("poll-b", data).map(Self::from_bytes)
    }
}
