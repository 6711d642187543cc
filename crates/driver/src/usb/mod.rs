//! USB backend
//!
//! Runs the polling engine against a real flightstick through rusb. Transfers
//! are blocking rusb calls made on dedicated worker threads so neither the
//! Tokio runtime nor the other transfer slot is ever blocked by them.

pub mod device;
pub mod transfers;
pub mod transport;

pub use device::{DeviceSummary, FlightstickDevice, InterruptEndpoint, OpenError};
pub use transfers::{TransferTimeouts, map_rusb_status};
pub use transport::UsbTransport;
