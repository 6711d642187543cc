//! USB transfer execution
//!
//! Blocking rusb reads that produce a [`Completion`]. rusb errors are mapped
//! onto the completion statuses the polling engine classifies.

use common::{Completion, TransferRequest};
use protocol::{ControlSetup, TransferStatus};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{trace, warn};

/// Timing of blocking transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTimeouts {
    /// Timeout of one control request
    pub control: Duration,
    /// Length of one interrupt read slice; cancellation is checked between
    /// slices
    pub interrupt_slice: Duration,
}

impl Default for TransferTimeouts {
    fn default() -> Self {
        Self {
            control: Duration::from_secs(1),
            interrupt_slice: Duration::from_millis(50),
        }
    }
}

/// Run one transfer to completion
///
/// `cancelled` is polled before the transfer starts and between interrupt
/// read slices; a cancelled transfer completes with `Cancelled`.
pub fn execute_transfer(
    handle: &DeviceHandle<Context>,
    request: &TransferRequest,
    timeouts: &TransferTimeouts,
    cancelled: impl Fn() -> bool,
) -> Completion {
    if cancelled() {
        return Completion::failed(TransferStatus::Cancelled);
    }

    match *request {
        TransferRequest::Interrupt { endpoint, length } => {
            execute_interrupt_read(handle, endpoint, length, timeouts.interrupt_slice, cancelled)
        }
        TransferRequest::Control(setup) => execute_control_read(handle, &setup, timeouts.control),
    }
}

/// Read the interrupt endpoint until data arrives or the read is cancelled
///
/// A slice that times out is not a transfer timeout; interrupt endpoints
/// only answer when the device has something to say.
fn execute_interrupt_read(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    length: usize,
    slice: Duration,
    cancelled: impl Fn() -> bool,
) -> Completion {
    let mut buffer = vec![0u8; length];

    loop {
        match handle.read_interrupt(endpoint, &mut buffer, slice) {
            Ok(len) => {
                buffer.truncate(len);
                trace!("Interrupt read on {:#x}: {} bytes", endpoint, len);
                return Completion::completed(buffer);
            }
            Err(rusb::Error::Timeout) => {
                if cancelled() {
                    return Completion::failed(TransferStatus::Cancelled);
                }
            }
            Err(e) => return Completion::failed(map_rusb_status(e)),
        }
    }
}

/// Execute a control IN request
fn execute_control_read(
    handle: &DeviceHandle<Context>,
    setup: &ControlSetup,
    timeout: Duration,
) -> Completion {
    if !setup.is_in() {
        warn!("Refusing control OUT request {:#x}", setup.request);
        return Completion::failed(TransferStatus::Other(LIBUSB_ERROR_INVALID_PARAM));
    }

    let mut buffer = vec![0u8; setup.length as usize];
    match handle.read_control(
        setup.request_type,
        setup.request,
        setup.value,
        setup.index,
        &mut buffer,
        timeout,
    ) {
        Ok(len) => {
            buffer.truncate(len);
            trace!("Control request {:#x}: {} bytes", setup.request, len);
            Completion::completed(buffer)
        }
        Err(e) => Completion::failed(map_rusb_status(e)),
    }
}

const LIBUSB_ERROR_IO: i32 = -1;
const LIBUSB_ERROR_INVALID_PARAM: i32 = -2;
const LIBUSB_ERROR_ACCESS: i32 = -3;
const LIBUSB_ERROR_NOT_FOUND: i32 = -5;
const LIBUSB_ERROR_BUSY: i32 = -6;
const LIBUSB_ERROR_NO_MEM: i32 = -11;
const LIBUSB_ERROR_NOT_SUPPORTED: i32 = -12;
const LIBUSB_ERROR_OTHER: i32 = -99;

/// Map rusb::Error to a completion status
///
/// Errors without a matching status keep their libusb error code.
pub fn map_rusb_status(err: rusb::Error) -> TransferStatus {
    match err {
        rusb::Error::Timeout => TransferStatus::TimedOut,
        rusb::Error::Pipe => TransferStatus::Stall,
        rusb::Error::NoDevice => TransferStatus::NoDevice,
        rusb::Error::Interrupted => TransferStatus::Cancelled,
        rusb::Error::Overflow => TransferStatus::Overflow,
        rusb::Error::Io => TransferStatus::Other(LIBUSB_ERROR_IO),
        rusb::Error::InvalidParam => TransferStatus::Other(LIBUSB_ERROR_INVALID_PARAM),
        rusb::Error::Access => TransferStatus::Other(LIBUSB_ERROR_ACCESS),
        rusb::Error::NotFound => TransferStatus::Other(LIBUSB_ERROR_NOT_FOUND),
        rusb::Error::Busy => TransferStatus::Other(LIBUSB_ERROR_BUSY),
        rusb::Error::NoMem => TransferStatus::Other(LIBUSB_ERROR_NO_MEM),
        rusb::Error::NotSupported => TransferStatus::Other(LIBUSB_ERROR_NOT_SUPPORTED),
        _ => TransferStatus::Other(LIBUSB_ERROR_OTHER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Classification, classify};

    #[test]
    fn test_map_rusb_status() {
        assert_eq!(map_rusb_status(rusb::Error::Timeout), TransferStatus::TimedOut);
        assert_eq!(map_rusb_status(rusb::Error::Pipe), TransferStatus::Stall);
        assert_eq!(map_rusb_status(rusb::Error::NoDevice), TransferStatus::NoDevice);
        assert_eq!(
            map_rusb_status(rusb::Error::Io),
            TransferStatus::Other(LIBUSB_ERROR_IO)
        );
    }

    #[test]
    fn test_unplug_terminates_streams() {
        assert_eq!(
            classify(map_rusb_status(rusb::Error::NoDevice)),
            Classification::Terminated
        );
        assert_eq!(
            classify(map_rusb_status(rusb::Error::Interrupted)),
            Classification::Terminated
        );
        assert_eq!(
            classify(map_rusb_status(rusb::Error::Access)),
            Classification::Unexpected
        );
    }
}
