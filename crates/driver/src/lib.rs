//! Polling engine for the Hori/Namco flightstick
//!
//! The device reports on two channels at once: an interrupt endpoint that
//! streams the analog axes, and a pair of vendor control requests that have
//! to be polled alternately for the remaining buttons and pads. A
//! [`DeviceSession`] keeps both going from their own completions and
//! publishes every decoded report to an [`EventSink`](common::EventSink).
//!
//! The engine only sees the [`Transport`](common::Transport) capability;
//! [`usb`] provides the rusb implementation used by the binary.

pub mod config;
pub mod poll;
pub mod publish;
pub mod session;
pub mod stats;
pub mod stream;
pub mod usb;

pub use config::{DriverConfig, MappingSettings, OutputFormat, PadMode};
pub use poll::ControlPollChain;
pub use publish::{Capabilities, Publisher, capabilities};
pub use session::{DeviceSession, ResetWindow, SessionError, SuspendReason};
pub use stats::TransferStats;
pub use stream::InterruptStream;

use common::SubmitError;
use tracing::{debug, error};

/// Log a failed submission; policy rejections are expected during teardown
pub(crate) fn log_submit_error(what: &str, err: &SubmitError) {
    if err.is_policy_rejection() {
        debug!("{} refused: {}", what, err);
    } else {
        error!("{} failed: {}", what, err);
    }
}
