//! Asynchronous transfer capability
//!
//! The engine never talks to a USB stack directly. It is handed a
//! [`Transport`] that can start a transfer on one of the session's two
//! transfer objects and later deliver its [`Completion`] by invoking a
//! callback on the transport's own completion context.
//!
//! Contract every implementation must honor:
//! - at most one transfer is in flight per [`TransferSlot`]; a second submit
//!   fails with [`SubmitError::Busy`]
//! - a completion callback may resubmit on its own slot; while it runs the
//!   slot is not considered in flight
//! - [`Transport::cancel`] blocks until the slot is quiescent (nothing
//!   pending and no callback executing), is idempotent, and makes any
//!   submit on that slot fail with [`SubmitError::Rejected`] until it returns
//! - a transfer interrupted by `cancel` still completes, with
//!   [`TransferStatus::Cancelled`]
//! - `cancel` must not be called from inside a completion callback

use protocol::{ControlSetup, TransferStatus};
use thiserror::Error;

/// The session's transfer objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferSlot {
    /// Continuous read of the interrupt IN endpoint
    Interrupt,
    /// The alternating vendor control requests
    Control,
}

impl std::fmt::Display for TransferSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferSlot::Interrupt => write!(f, "interrupt"),
            TransferSlot::Control => write!(f, "control"),
        }
    }
}

/// Where a transfer goes and how much it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRequest {
    /// Read up to `length` bytes from an interrupt IN endpoint
    Interrupt { endpoint: u8, length: usize },
    /// Control transfer on the default pipe
    Control(ControlSetup),
}

impl TransferRequest {
    /// Size of the buffer the transport must provide
    pub fn buffer_len(&self) -> usize {
        match self {
            TransferRequest::Interrupt { length, .. } => *length,
            TransferRequest::Control(setup) => setup.length as usize,
        }
    }
}

/// Allocation discipline for a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    /// Caller is a completion callback and must not block
    NoWait,
    /// Caller is a lifecycle entry point and may block
    MayBlock,
}

/// Result of one finished transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub status: TransferStatus,
    /// Bytes actually transferred; empty unless `status` is `Completed`
    pub data: Vec<u8>,
}

impl Completion {
    pub fn completed(data: Vec<u8>) -> Self {
        Self {
            status: TransferStatus::Completed,
            data,
        }
    }

    pub fn failed(status: TransferStatus) -> Self {
        Self {
            status,
            data: Vec::new(),
        }
    }
}

/// Callback invoked exactly once when a submitted transfer finishes
pub type CompletionHandler = Box<dyn FnOnce(Completion) + Send + 'static>;

/// Reasons a submission can be refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Resources for the transfer could not be allocated
    #[error("out of memory")]
    NoMemory,

    /// The slot already has a transfer in flight
    #[error("transfer already in flight")]
    Busy,

    /// The platform deliberately refused the submission (slot being cancelled,
    /// forced suspend). Not an error condition.
    #[error("submission rejected by policy")]
    Rejected,

    /// The device is gone
    #[error("no such device")]
    NoDevice,

    /// Any other transport failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl SubmitError {
    /// True for the deliberate refusal that must not be reported as an error
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, SubmitError::Rejected)
    }
}

/// Capability to run asynchronous transfers against the device
pub trait Transport: Send + Sync {
    /// Start a transfer on `slot`; `on_complete` runs on the completion context
    fn submit(
        &self,
        slot: TransferSlot,
        request: TransferRequest,
        alloc: AllocMode,
        on_complete: CompletionHandler,
    ) -> Result<(), SubmitError>;

    /// Cancel whatever is in flight on `slot` and wait for quiescence
    fn cancel(&self, slot: TransferSlot);
}
