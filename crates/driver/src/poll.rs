//! Control poll chain
//!
//! The two vendor requests are issued back to back forever, A, B, A, B, each
//! one submitted from the completion of the previous one. There is no timer;
//! the rate is whatever the device round trip allows. A timeout or a
//! teardown status ends the chain until it is started again, always at A.

use common::{AllocMode, Completion, SubmitError, TransferRequest, TransferSlot, Transport};
use protocol::{Classification, PollAReport, PollBReport, PollPhase, classify};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

use crate::log_submit_error;
use crate::publish::Publisher;
use crate::stats::{Counters, TransferStats};

struct ChainState {
    /// Phase of the outstanding (or last issued) request
    phase: PollPhase,
    /// A request is outstanding
    running: bool,
}

struct ChainShared {
    transport: Arc<dyn Transport>,
    publisher: Arc<Publisher>,
    state: Mutex<ChainState>,
    counters: Counters,
}

/// Ping-pong poller of the two vendor requests
pub struct ControlPollChain {
    shared: Arc<ChainShared>,
}

impl ControlPollChain {
    pub fn new(transport: Arc<dyn Transport>, publisher: Arc<Publisher>) -> Self {
        Self {
            shared: Arc::new(ChainShared {
                transport,
                publisher,
                state: Mutex::new(ChainState {
                    phase: PollPhase::A,
                    running: false,
                }),
                counters: Counters::default(),
            }),
        }
    }

    /// Issue the first request of a new chain, always phase A
    pub fn start(&self, alloc: AllocMode) -> Result<(), SubmitError> {
        self.shared.submit(PollPhase::A, alloc)
    }

    /// Cancel the outstanding request and wait until its callback has finished
    pub fn stop(&self) {
        self.shared.transport.cancel(TransferSlot::Control);
        self.shared.state().running = false;
    }

    pub fn phase(&self) -> PollPhase {
        self.shared.state().phase
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().running
    }

    pub fn stats(&self) -> TransferStats {
        self.shared.counters.snapshot()
    }
}

impl ChainShared {
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn submit(self: &Arc<Self>, phase: PollPhase, alloc: AllocMode) -> Result<(), SubmitError> {
        {
            let mut state = self.state();
            state.phase = phase;
            state.running = true;
        }

        let shared = Arc::clone(self);
        let result = self.transport.submit(
            TransferSlot::Control,
            TransferRequest::Control(phase.setup()),
            alloc,
            Box::new(move |completion| shared.on_complete(phase, completion)),
        );
        if result.is_err() {
            self.state().running = false;
        }
        result
    }

    fn on_complete(self: Arc<Self>, phase: PollPhase, completion: Completion) {
        let classification = classify(completion.status);
        self.counters.record_completion(classification);

        match classification {
            Classification::Success => self.publish(phase, &completion.data),
            Classification::ProtocolStall => {
                warn!("{} stalled, advancing to {}", phase, phase.next());
            }
            Classification::Unexpected => {
                error!("{} failed: {:?}", phase, completion.status);
            }
            Classification::TransientTimeout => {
                warn!("{} timed out, poll chain halted", phase);
                self.state().running = false;
                return;
            }
            Classification::Terminated => {
                debug!("Poll chain terminated at {}: {:?}", phase, completion.status);
                self.state().running = false;
                return;
            }
        }

        if let Err(e) = self.submit(phase.next(), AllocMode::NoWait) {
            self.counters.record_submit_failure();
            log_submit_error("poll resubmit", &e);
        }
    }

    fn publish(&self, phase: PollPhase, data: &[u8]) {
        let decoded = match phase {
            PollPhase::A => PollAReport::decode(data).map(|report| {
                trace!("Poll A report: {:?}", report);
                self.publisher.poll_a(&report);
            }),
            PollPhase::B => PollBReport::decode(data).map(|report| {
                trace!("Poll B report: {:?}", report);
                self.publisher.poll_b(&report);
            }),
        };

        match decoded {
            Ok(()) => self.counters.record_report(),
            Err(e) => {
                warn!("Dropping {} report: {}", phase, e);
                self.counters.record_length_mismatch();
            }
        }
    }
}
