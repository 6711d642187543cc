//! Transfer completion status and its classification

use serde::{Deserialize, Serialize};

/// Completion status reported by the transport for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Transfer finished, data is valid
    Completed,
    /// Host controller gave up waiting for the device
    TimedOut,
    /// Transfer was unlinked or killed
    Cancelled,
    /// Host controller or device is shutting down
    Shutdown,
    /// Device was removed
    NoDevice,
    /// Endpoint stalled
    Stall,
    /// Device sent more data than requested
    Overflow,
    /// Any other transport error, carrying the raw code
    Other(i32),
}

/// errno values used by kernel-style hosts
mod errno {
    pub const ENOENT: i32 = 2;
    pub const ENODEV: i32 = 19;
    pub const EPIPE: i32 = 32;
    pub const ETIME: i32 = 62;
    pub const EOVERFLOW: i32 = 75;
    pub const ECONNRESET: i32 = 104;
    pub const ESHUTDOWN: i32 = 108;
}

impl TransferStatus {
    /// Map a kernel-style completion code (0 or a negative errno)
    pub fn from_errno(code: i32) -> Self {
        match -code {
            0 => TransferStatus::Completed,
            errno::ETIME => TransferStatus::TimedOut,
            errno::ECONNRESET | errno::ENOENT => TransferStatus::Cancelled,
            errno::ESHUTDOWN => TransferStatus::Shutdown,
            errno::ENODEV => TransferStatus::NoDevice,
            errno::EPIPE => TransferStatus::Stall,
            errno::EOVERFLOW => TransferStatus::Overflow,
            _ => TransferStatus::Other(code),
        }
    }
}

/// What a completion handler should make of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Success,
    TransientTimeout,
    Terminated,
    ProtocolStall,
    Unexpected,
}

/// Classify a completion status. Resubmission policy is left to the caller.
pub fn classify(status: TransferStatus) -> Classification {
    match status {
        TransferStatus::Completed => Classification::Success,
        TransferStatus::TimedOut => Classification::TransientTimeout,
        TransferStatus::Cancelled | TransferStatus::Shutdown | TransferStatus::NoDevice => {
            Classification::Terminated
        }
        TransferStatus::Stall => Classification::ProtocolStall,
        TransferStatus::Overflow | TransferStatus::Other(_) => Classification::Unexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(TransferStatus::Completed), Classification::Success);
        assert_eq!(
            classify(TransferStatus::TimedOut),
            Classification::TransientTimeout
        );
        assert_eq!(classify(TransferStatus::Cancelled), Classification::Terminated);
        assert_eq!(classify(TransferStatus::Shutdown), Classification::Terminated);
        assert_eq!(classify(TransferStatus::NoDevice), Classification::Terminated);
        assert_eq!(classify(TransferStatus::Stall), Classification::ProtocolStall);
        assert_eq!(classify(TransferStatus::Overflow), Classification::Unexpected);
        assert_eq!(classify(TransferStatus::Other(-71)), Classification::Unexpected);
    }

    #[test]
    fn test_from_errno() {
        assert_eq!(TransferStatus::from_errno(0), TransferStatus::Completed);
        assert_eq!(TransferStatus::from_errno(-62), TransferStatus::TimedOut);
        assert_eq!(TransferStatus::from_errno(-104), TransferStatus::Cancelled);
        assert_eq!(TransferStatus::from_errno(-2), TransferStatus::Cancelled);
        assert_eq!(TransferStatus::from_errno(-108), TransferStatus::Shutdown);
        assert_eq!(TransferStatus::from_errno(-19), TransferStatus::NoDevice);
        assert_eq!(TransferStatus::from_errno(-32), TransferStatus::Stall);
        assert_eq!(TransferStatus::from_errno(-75), TransferStatus::Overflow);
        assert_eq!(TransferStatus::from_errno(-71), TransferStatus::Other(-71));
    }
}
