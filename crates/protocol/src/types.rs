//! Device identity and control request definitions

use serde::{Deserialize, Serialize};

/// USB vendor id of the flightstick
pub const VENDOR_ID: u16 = 0x06d3;

/// USB product id of the flightstick
pub const PRODUCT_ID: u16 = 0x0f10;

/// Human readable device name
pub const PRODUCT_NAME: &str = "Mitsubishi Hori/Namco Flightstick";

/// Vendor request returning the poll A report
pub const REQUEST_POLL_A: u8 = 0x00;

/// Vendor request returning the poll B report
pub const REQUEST_POLL_B: u8 = 0x01;

/// bmRequestType bits
pub const DIR_IN: u8 = 0x80;
pub const TYPE_VENDOR: u8 = 0x40;
pub const RECIP_ENDPOINT: u8 = 0x02;

/// bmRequestType used by both poll requests
pub const POLL_REQUEST_TYPE: u8 = DIR_IN | TYPE_VENDOR | RECIP_ENDPOINT;

/// wValue of both poll requests
pub const POLL_VALUE: u16 = 0;

/// wIndex of both poll requests
pub const POLL_INDEX: u16 = 1;

/// Setup packet of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlSetup {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlSetup {
    /// True when the data stage flows from device to host
    pub fn is_in(&self) -> bool {
        (self.request_type & DIR_IN) != 0
    }
}

/// Which of the two vendor requests is outstanding on the control pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollPhase {
    A,
    B,
}

impl PollPhase {
    /// The phase issued after this one completes
    pub fn next(self) -> Self {
        match self {
            PollPhase::A => PollPhase::B,
            PollPhase::B => PollPhase::A,
        }
    }

    /// Vendor request code for this phase
    pub fn request_code(self) -> u8 {
        match self {
            PollPhase::A => REQUEST_POLL_A,
            PollPhase::B => REQUEST_POLL_B,
        }
    }

    /// Expected response length for this phase
    pub fn response_len(self) -> usize {
        match self {
            PollPhase::A => crate::reports::POLL_A_REPORT_LEN,
            PollPhase::B => crate::reports::POLL_B_REPORT_LEN,
        }
    }

    /// Setup packet for this phase's control request
    pub fn setup(self) -> ControlSetup {
        ControlSetup {
            request_type: POLL_REQUEST_TYPE,
            request: self.request_code(),
            value: POLL_VALUE,
            index: POLL_INDEX,
            length: self.response_len() as u16,
        }
    }
}

impl std::fmt::Display for PollPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollPhase::A => write!(f, "poll-a"),
            PollPhase::B => write!(f, "poll-b"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_request_type() {
        // IN | VENDOR | ENDPOINT
        assert_eq!(POLL_REQUEST_TYPE, 0xC2);
    }

    #[test]
    fn test_phase_alternates() {
        assert_eq!(PollPhase::A.next(), PollPhase::B);
        assert_eq!(PollPhase::B.next(), PollPhase::A);
        assert_eq!(PollPhase::A.next().next(), PollPhase::A);
    }

    #[test]
    fn test_phase_setup() {
        let a = PollPhase::A.setup();
        assert_eq!(a.request, 0x00);
        assert_eq!(a.value, 0);
        assert_eq!(a.index, 1);
        assert_eq!(a.length, 2);
        assert!(a.is_in());

        let b = PollPhase::B.setup();
        assert_eq!(b.request, 0x01);
        assert_eq!(b.request_type, a.request_type);
        assert_eq!(b.length, 2);
    }
}
