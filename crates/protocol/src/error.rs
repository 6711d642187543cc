//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A report buffer did not match the fixed size of its layout
    #[error("{report} report length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        report: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
