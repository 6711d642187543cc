//! Test utilities for the flightstick driver
//!
//! Provides in-memory implementations of the two capabilities the engine
//! consumes, so completion-driven behavior can be stepped deterministically.
//!
//! # Example
//!
//! ```
//! use common::test_utils::MockTransport;
//! use common::{AllocMode, Completion, Transport, TransferRequest, TransferSlot};
//!
//! let transport = MockTransport::new();
//! let request = TransferRequest::Interrupt { endpoint: 0x81, length: 8 };
//! transport
//!     .submit(TransferSlot::Interrupt, request, AllocMode::MayBlock, Box::new(|c| {
//!         assert_eq!(c.data.len(), 8);
//!     }))
//!     .unwrap();
//!
//! assert!(transport.is_pending(TransferSlot::Interrupt));
//! assert!(transport.complete(TransferSlot::Interrupt, Completion::completed(vec![0; 8])));
//! assert!(!transport.is_pending(TransferSlot::Interrupt));
//! ```

use crate::sink::EventSink;
use crate::transport::{
    AllocMode, Completion, CompletionHandler, SubmitError, TransferRequest, TransferSlot,
    Transport,
};
use protocol::{Axis, Button, TransferStatus};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub slot: TransferSlot,
    pub request: TransferRequest,
    pub alloc: AllocMode,
}

struct PendingTransfer {
    handler: CompletionHandler,
}

#[derive(Default)]
struct MockState {
    pending: HashMap<TransferSlot, PendingTransfer>,
    submissions: Vec<Submission>,
    rejecting: HashSet<TransferSlot>,
    fail_next: HashMap<TransferSlot, SubmitError>,
    cancels: Vec<TransferSlot>,
}

/// In-memory [`Transport`]
///
/// Nothing completes on its own; tests call [`MockTransport::complete`] to
/// run the pending callback on the calling thread. `cancel` behaves like a
/// real host: it completes the pending transfer with `Cancelled` and rejects
/// resubmissions made from that callback.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Finish the transfer pending on `slot`. Returns false if none was pending.
    pub fn complete(&self, slot: TransferSlot, completion: Completion) -> bool {
        let pending = self.state().pending.remove(&slot);
        match pending {
            Some(transfer) => {
                (transfer.handler)(completion);
                true
            }
            None => false,
        }
    }

    /// Finish the pending transfer on `slot` with a bare status
    pub fn complete_with_status(&self, slot: TransferSlot, status: TransferStatus) -> bool {
        self.complete(slot, Completion::failed(status))
    }

    /// Make the next submit on `slot` fail with `error`
    pub fn fail_next_submit(&self, slot: TransferSlot, error: SubmitError) {
        self.state().fail_next.insert(slot, error);
    }

    pub fn is_pending(&self, slot: TransferSlot) -> bool {
        self.state().pending.contains_key(&slot)
    }

    /// Number of transfers in flight across both slots
    pub fn in_flight(&self) -> usize {
        self.state().pending.len()
    }

    /// Every accepted submission, oldest first
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Accepted submissions on one slot
    pub fn submissions_for(&self, slot: TransferSlot) -> Vec<Submission> {
        self.state()
            .submissions
            .iter()
            .filter(|s| s.slot == slot)
            .copied()
            .collect()
    }

    /// The most recent accepted submission on `slot`
    pub fn last_submission(&self, slot: TransferSlot) -> Option<Submission> {
        self.state()
            .submissions
            .iter()
            .rev()
            .find(|s| s.slot == slot)
            .copied()
    }

    /// Slots passed to `cancel`, in call order
    pub fn cancels(&self) -> Vec<TransferSlot> {
        self.state().cancels.clone()
    }
}

impl Transport for MockTransport {
    fn submit(
        &self,
        slot: TransferSlot,
        request: TransferRequest,
        alloc: AllocMode,
        on_complete: CompletionHandler,
    ) -> Result<(), SubmitError> {
        let mut state = self.state();
        if let Some(error) = state.fail_next.remove(&slot) {
            return Err(error);
        }
        if state.rejecting.contains(&slot) {
            return Err(SubmitError::Rejected);
        }
        if state.pending.contains_key(&slot) {
            return Err(SubmitError::Busy);
        }

        state.submissions.push(Submission {
            slot,
            request,
            alloc,
        });
        state.pending.insert(
            slot,
            PendingTransfer {
                handler: on_complete,
            },
        );
        Ok(())
    }

    fn cancel(&self, slot: TransferSlot) {
        let pending = {
            let mut state = self.state();
            state.cancels.push(slot);
            state.rejecting.insert(slot);
            state.pending.remove(&slot)
        };

        if let Some(transfer) = pending {
            (transfer.handler)(Completion::failed(TransferStatus::Cancelled));
        }

        self.state().rejecting.remove(&slot);
    }
}

/// One call received by a [`RecordingSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCall {
    Button(Button, bool),
    Axis(Axis, i32),
    Flush,
}

/// [`EventSink`] that records every call verbatim
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls_mut(&self) -> MutexGuard<'_, Vec<SinkCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls_mut().clone()
    }

    /// Button calls only, in order
    pub fn buttons(&self) -> Vec<(Button, bool)> {
        self.calls_mut()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Button(b, p) => Some((*b, *p)),
                _ => None,
            })
            .collect()
    }

    /// Axis calls only, in order
    pub fn axes(&self) -> Vec<(Axis, i32)> {
        self.calls_mut()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Axis(a, v) => Some((*a, *v)),
                _ => None,
            })
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.calls_mut()
            .iter()
            .filter(|c| matches!(c, SinkCall::Flush))
            .count()
    }

    /// Last reported state of `button`, if it was ever reported
    pub fn button_state(&self, button: Button) -> Option<bool> {
        self.buttons()
            .into_iter()
            .rev()
            .find(|(b, _)| *b == button)
            .map(|(_, p)| p)
    }

    /// Last reported value of `axis`, if it was ever reported
    pub fn axis_value(&self, axis: Axis) -> Option<i32> {
        self.axes()
            .into_iter()
            .rev()
            .find(|(a, _)| *a == axis)
            .map(|(_, v)| v)
    }

    pub fn clear(&self) {
        self.calls_mut().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish_button(&self, button: Button, pressed: bool) {
        self.calls_mut().push(SinkCall::Button(button, pressed));
    }

    fn publish_axis(&self, axis: Axis, value: i32) {
        self.calls_mut().push(SinkCall::Axis(axis, value));
    }

    fn flush_frame(&self) {
        self.calls_mut().push(SinkCall::Flush);
    }
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn interrupt_request() -> TransferRequest {
        TransferRequest::Interrupt {
            endpoint: 0x81,
            length: 8,
        }
    }

    #[test]
    fn test_second_submit_is_busy() {
        let transport = MockTransport::new();
        transport
            .submit(
                TransferSlot::Interrupt,
                interrupt_request(),
                AllocMode::MayBlock,
                Box::new(|_| {}),
            )
            .unwrap();

        let err = transport
            .submit(
                TransferSlot::Interrupt,
                interrupt_request(),
                AllocMode::MayBlock,
                Box::new(|_| {}),
            )
            .unwrap_err();
        assert_eq!(err, SubmitError::Busy);
        assert_eq!(transport.submissions().len(), 1);
    }

    #[test]
    fn test_cancel_completes_and_rejects_resubmit() {
        let transport = Arc::new(MockTransport::new());
        let seen = Arc::new(Mutex::new(None));

        let t = transport.clone();
        let s = seen.clone();
        transport
            .submit(
                TransferSlot::Control,
                interrupt_request(),
                AllocMode::MayBlock,
                Box::new(move |completion: Completion| {
                    let resubmit = t.submit(
                        TransferSlot::Control,
                        interrupt_request(),
                        AllocMode::NoWait,
                        Box::new(|_| {}),
                    );
                    *s.lock().unwrap() = Some((completion.status, resubmit));
                }),
            )
            .unwrap();

        transport.cancel(TransferSlot::Control);

        let (status, resubmit) = seen.lock().unwrap().take().unwrap();
        assert_eq!(status, TransferStatus::Cancelled);
        assert_eq!(resubmit, Err(SubmitError::Rejected));
        assert_eq!(transport.in_flight(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let transport = MockTransport::new();
        transport.cancel(TransferSlot::Interrupt);
        transport.cancel(TransferSlot::Interrupt);
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.cancels().len(), 2);
    }

    #[test]
    fn test_injected_failure_applies_once() {
        let transport = MockTransport::new();
        let calls = Arc::new(AtomicUsize::new(0));
        transport.fail_next_submit(TransferSlot::Interrupt, SubmitError::NoMemory);

        let c = calls.clone();
        let first = transport.submit(
            TransferSlot::Interrupt,
            interrupt_request(),
            AllocMode::MayBlock,
            Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(first, Err(SubmitError::NoMemory));

        let c = calls.clone();
        transport
            .submit(
                TransferSlot::Interrupt,
                interrupt_request(),
                AllocMode::MayBlock,
                Box::new(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(transport.complete(TransferSlot::Interrupt, Completion::completed(vec![])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recording_sink_helpers() {
        let sink = RecordingSink::new();
        sink.publish_button(Button::A, true);
        sink.publish_axis(Axis::X, 7);
        sink.publish_button(Button::A, false);
        sink.flush_frame();

        assert_eq!(sink.button_state(Button::A), Some(false));
        assert_eq!(sink.axis_value(Axis::X), Some(7));
        assert_eq!(sink.axis_value(Axis::Y), None);
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(sink.calls().len(), 4);
    }
}
