//! Wire protocol of the Hori/Namco flightstick
//!
//! This crate describes everything that crosses the USB cable: the device
//! identity, the two vendor control requests, the three fixed report layouts,
//! and the transport completion statuses. It also defines the normalized
//! event vocabulary decoded reports are translated into. Nothing in here
//! performs I/O.
//!
//! # Example
//!
//! ```
//! use protocol::{InterruptReport, PollPhase, classify, Classification, TransferStatus};
//!
//! let report = InterruptReport::decode(&[10, 20, 30, 40, 50, 60, 0xFF, 0x00]).unwrap();
//! assert_eq!(report.x, 10);
//! assert!(report.button_b);
//!
//! assert_eq!(PollPhase::A.next(), PollPhase::B);
//! assert_eq!(classify(TransferStatus::Stall), Classification::ProtocolStall);
//! ```

pub mod error;
pub mod events;
pub mod reports;
pub mod status;
pub mod types;

pub use error::{ProtocolError, Result};
pub use events::{Axis, Button, InputEvent, InputFrame};
pub use reports::{
    INTERRUPT_REPORT_LEN, InterruptReport, ModeSelect, POLL_A_REPORT_LEN, POLL_B_REPORT_LEN,
    Pad, PollAReport, PollBReport, ternary,
};
pub use status::{Classification, TransferStatus, classify};
pub use types::{
    ControlSetup, POLL_INDEX, POLL_REQUEST_TYPE, POLL_VALUE, PRODUCT_ID, PRODUCT_NAME, PollPhase,
    VENDOR_ID,
};
