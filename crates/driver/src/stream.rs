//! Interrupt stream driver
//!
//! Keeps exactly one read outstanding on the interrupt IN endpoint. Every
//! completion except a timeout or a teardown status resubmits the read from
//! the completion context, so the stream runs until it is cancelled or the
//! device goes away.

use common::{AllocMode, Completion, SubmitError, TransferRequest, TransferSlot, Transport};
use protocol::{Classification, InterruptReport, classify};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, trace, warn};

use crate::log_submit_error;
use crate::publish::Publisher;
use crate::stats::{Counters, TransferStats};
use crate::usb::InterruptEndpoint;

struct StreamShared {
    transport: Arc<dyn Transport>,
    publisher: Arc<Publisher>,
    endpoint: InterruptEndpoint,
    /// A read is outstanding
    armed: AtomicBool,
    counters: Counters,
}

/// Continuous reader of the interrupt endpoint
pub struct InterruptStream {
    shared: Arc<StreamShared>,
}

impl InterruptStream {
    pub fn new(
        transport: Arc<dyn Transport>,
        publisher: Arc<Publisher>,
        endpoint: InterruptEndpoint,
    ) -> Self {
        Self {
            shared: Arc::new(StreamShared {
                transport,
                publisher,
                endpoint,
                armed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Submit the first read
    pub fn arm(&self, alloc: AllocMode) -> Result<(), SubmitError> {
        self.shared.submit(alloc)
    }

    /// Cancel the outstanding read and wait until its callback has finished
    pub fn cancel(&self) {
        self.shared.transport.cancel(TransferSlot::Interrupt);
        self.shared.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> InterruptEndpoint {
        self.shared.endpoint
    }

    pub fn stats(&self) -> TransferStats {
        self.shared.counters.snapshot()
    }
}

impl StreamShared {
    fn submit(self: &Arc<Self>, alloc: AllocMode) -> Result<(), SubmitError> {
        let request = TransferRequest::Interrupt {
            endpoint: self.endpoint.address,
            length: self.endpoint.read_len(),
        };
        let shared = Arc::clone(self);

        // The completion may run before submit returns
        self.armed.store(true, Ordering::SeqCst);
        let result = self.transport.submit(
            TransferSlot::Interrupt,
            request,
            alloc,
            Box::new(move |completion| shared.on_complete(completion)),
        );
        if result.is_err() {
            self.armed.store(false, Ordering::SeqCst);
        }
        result
    }

    fn on_complete(self: Arc<Self>, completion: Completion) {
        let classification = classify(completion.status);
        self.counters.record_completion(classification);

        match classification {
            Classification::Success => match InterruptReport::decode(&completion.data) {
                Ok(report) => {
                    trace!("Interrupt report: {:?}", report);
                    self.publisher.interrupt(&report);
                    self.counters.record_report();
                }
                Err(e) => {
                    warn!("Dropping interrupt report: {}", e);
                    self.counters.record_length_mismatch();
                }
            },
            Classification::TransientTimeout => {
                warn!("Interrupt read timed out, stream stalled until re-armed");
                self.armed.store(false, Ordering::SeqCst);
                return;
            }
            Classification::Terminated => {
                debug!("Interrupt stream terminated: {:?}", completion.status);
                self.armed.store(false, Ordering::SeqCst);
                return;
            }
            Classification::ProtocolStall => {
                warn!("Interrupt endpoint stalled, resubmitting");
            }
            Classification::Unexpected => {
                error!("Interrupt transfer failed: {:?}", completion.status);
            }
        }

        if let Err(e) = self.submit(AllocMode::NoWait) {
            self.counters.record_submit_failure();
            log_submit_error("interrupt resubmit", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingSettings;
    use common::test_utils::{MockTransport, RecordingSink, SinkCall};
    use protocol::{Axis, TransferStatus};

    fn stream_with_maxp(
        max_packet_size: u16,
    ) -> (InterruptStream, Arc<MockTransport>, Arc<RecordingSink>) {
        let transport = Arc::new(MockTransport::new());
        let sink = Arc::new(RecordingSink::new());
        let publisher = Arc::new(Publisher::new(sink.clone(), MappingSettings::default()));
        let endpoint = InterruptEndpoint {
            address: 0x81,
            max_packet_size,
            interval: 10,
        };
        let stream = InterruptStream::new(transport.clone(), publisher, endpoint);
        (stream, transport, sink)
    }

    fn stream() -> (InterruptStream, Arc<MockTransport>, Arc<RecordingSink>) {
        stream_with_maxp(8)
    }

    #[test]
    fn test_arm_submits_one_read() {
        let (stream, transport, _) = stream();
        stream.arm(AllocMode::MayBlock).unwrap();

        assert!(stream.is_armed());
        let submission = transport.last_submission(TransferSlot::Interrupt).unwrap();
        assert_eq!(
            submission.request,
            TransferRequest::Interrupt {
                endpoint: 0x81,
                length: 8
            }
        );
        assert_eq!(submission.alloc, AllocMode::MayBlock);
    }

    #[test]
    fn test_success_publishes_and_resubmits_without_blocking() {
        let (stream, transport, sink) = stream();
        stream.arm(AllocMode::MayBlock).unwrap();

        transport.complete(
            TransferSlot::Interrupt,
            Completion::completed(vec![1, 2, 3, 4, 5, 6, 0xFF, 0xFF]),
        );

        assert_eq!(sink.axis_value(Axis::Throttle), Some(6));
        assert_eq!(sink.flush_count(), 1);
        assert!(transport.is_pending(TransferSlot::Interrupt));
        let resubmit = transport.last_submission(TransferSlot::Interrupt).unwrap();
        assert_eq!(resubmit.alloc, AllocMode::NoWait);
        assert_eq!(stream.stats().reports, 1);
    }

    #[test]
    fn test_length_mismatch_is_dropped_but_resubmits() {
        let (stream, transport, sink) = stream();
        stream.arm(AllocMode::MayBlock).unwrap();

        transport.complete(TransferSlot::Interrupt, Completion::completed(vec![0; 5]));

        assert!(sink.calls().is_empty());
        assert!(transport.is_pending(TransferSlot::Interrupt));
        assert_eq!(stream.stats().length_mismatches, 1);
    }

    #[test]
    fn test_reads_whole_packet_and_rejects_long_report() {
        let (stream, transport, sink) = stream_with_maxp(64);
        stream.arm(AllocMode::MayBlock).unwrap();

        let submission = transport.last_submission(TransferSlot::Interrupt).unwrap();
        assert_eq!(
            submission.request,
            TransferRequest::Interrupt {
                endpoint: 0x81,
                length: 64
            }
        );

        transport.complete(TransferSlot::Interrupt, Completion::completed(vec![0; 9]));

        assert!(sink.calls().is_empty());
        assert!(transport.is_pending(TransferSlot::Interrupt));
        let stats = stream.stats();
        assert_eq!(stats.length_mismatches, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_stall_and_unexpected_resubmit() {
        let (stream, transport, sink) = stream();
        stream.arm(AllocMode::MayBlock).unwrap();

        transport.complete_with_status(TransferSlot::Interrupt, TransferStatus::Stall);
        assert!(transport.is_pending(TransferSlot::Interrupt));
        transport.complete_with_status(TransferSlot::Interrupt, TransferStatus::Other(-71));
        assert!(transport.is_pending(TransferSlot::Interrupt));

        assert!(!sink.calls().contains(&SinkCall::Flush));
        let stats = stream.stats();
        assert_eq!(stats.stalls, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(transport.submissions_for(TransferSlot::Interrupt).len(), 3);
    }

    #[test]
    fn test_timeout_and_termination_disarm() {
        for status in [
            TransferStatus::TimedOut,
            TransferStatus::Cancelled,
            TransferStatus::Shutdown,
            TransferStatus::NoDevice,
        ] {
            let (stream, transport, _) = stream();
            stream.arm(AllocMode::MayBlock).unwrap();

            transport.complete_with_status(TransferSlot::Interrupt, status);

            assert!(!transport.is_pending(TransferSlot::Interrupt), "{:?}", status);
            assert!(!stream.is_armed(), "{:?}", status);
        }
    }

    #[test]
    fn test_failed_resubmit_disarms() {
        let (stream, transport, _) = stream();
        stream.arm(AllocMode::MayBlock).unwrap();
        transport.fail_next_submit(TransferSlot::Interrupt, SubmitError::NoMemory);

        transport.complete(TransferSlot::Interrupt, Completion::completed(vec![0; 8]));

        assert!(!stream.is_armed());
        assert_eq!(stream.stats().submit_failures, 1);
    }

    #[test]
    fn test_cancel_leaves_nothing_in_flight() {
        let (stream, transport, _) = stream();
        stream.arm(AllocMode::MayBlock).unwrap();

        stream.cancel();
        stream.cancel();

        assert_eq!(transport.in_flight(), 0);
        assert!(!stream.is_armed());
    }
}
