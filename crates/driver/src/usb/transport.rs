//! rusb-backed transport
//!
//! Each transfer slot gets a dedicated worker thread that performs blocking
//! rusb transfers and runs completion callbacks, so the two slots never wait
//! on each other and a callback always runs on its own slot's thread.
//!
//! Submissions are handed to the worker over a single-entry channel. The
//! slot state tracks whether a transfer is pending or its callback is
//! running; `cancel` raises a flag the worker polls between interrupt read
//! slices and then waits on a condition variable until the slot is quiet.

use async_channel::{Receiver, Sender, bounded};
use common::{
    AllocMode, Completion, CompletionHandler, SubmitError, TransferRequest, TransferSlot,
    Transport,
};
use rusb::{Context, DeviceHandle};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

use crate::usb::transfers::{TransferTimeouts, execute_transfer};

/// Performs one blocking transfer; the flag reports a pending cancel
type Executor = Box<dyn FnMut(&TransferRequest, &dyn Fn() -> bool) -> Completion + Send>;

fn rusb_executor(handle: Arc<DeviceHandle<Context>>, timeouts: TransferTimeouts) -> Executor {
    Box::new(
        move |request: &TransferRequest, cancelled: &dyn Fn() -> bool| {
            execute_transfer(&handle, request, &timeouts, cancelled)
        },
    )
}

struct Job {
    request: TransferRequest,
    on_complete: CompletionHandler,
}

#[derive(Debug, Default)]
struct SlotState {
    /// Submitted and not yet handed to its callback
    pending: bool,
    /// Callback currently executing
    in_callback: bool,
    /// Threads blocked in `cancel`
    cancellers: usize,
    /// Transport is shutting down
    closed: bool,
}

impl SlotState {
    fn is_quiescent(&self) -> bool {
        !self.pending && !self.in_callback
    }
}

#[derive(Default)]
struct SlotShared {
    state: Mutex<SlotState>,
    quiescent: Condvar,
}

impl SlotShared {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_cancelling(&self) -> bool {
        let state = self.state();
        state.cancellers > 0 || state.closed
    }

    fn begin_callback(&self) {
        let mut state = self.state();
        state.pending = false;
        state.in_callback = true;
    }

    /// Block until nothing is pending and no callback runs, rejecting
    /// submissions meanwhile. Returns false if the slot was already quiet.
    fn wait_quiescent(&self) -> bool {
        let mut state = self.state();
        if state.is_quiescent() {
            return false;
        }

        state.cancellers += 1;
        while !state.is_quiescent() {
            state = self
                .quiescent
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        state.cancellers -= 1;
        true
    }

    fn end_callback(&self) {
        let mut state = self.state();
        state.in_callback = false;
        if state.is_quiescent() {
            self.quiescent.notify_all();
        }
    }
}

/// One slot's worker thread and its submission queue
struct SlotWorker {
    slot: TransferSlot,
    shared: Arc<SlotShared>,
    job_tx: Sender<Job>,
    thread_id: ThreadId,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SlotWorker {
    fn spawn(slot: TransferSlot, execute: Executor) -> std::io::Result<Self> {
        let shared = Arc::new(SlotShared::default());
        let (job_tx, job_rx) = bounded(1);

        let thread = thread::Builder::new()
            .name(format!("usb-{}", slot))
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_worker(slot, execute, shared, job_rx)
            })?;

        Ok(Self {
            slot,
            shared,
            job_tx,
            thread_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn submit(
        &self,
        request: TransferRequest,
        alloc: AllocMode,
        on_complete: CompletionHandler,
    ) -> Result<(), SubmitError> {
        {
            let mut state = self.shared.state();
            if state.closed {
                return Err(SubmitError::NoDevice);
            }
            if state.cancellers > 0 {
                return Err(SubmitError::Rejected);
            }
            if state.pending {
                return Err(SubmitError::Busy);
            }
            state.pending = true;
        }

        let job = Job {
            request,
            on_complete,
        };
        let sent = match alloc {
            AllocMode::NoWait => self.job_tx.try_send(job).map_err(|_| "queue full or closed"),
            AllocMode::MayBlock => self.job_tx.send_blocking(job).map_err(|_| "queue closed"),
        };

        if let Err(reason) = sent {
            let mut state = self.shared.state();
            state.pending = false;
            if state.is_quiescent() {
                self.shared.quiescent.notify_all();
            }
            return Err(SubmitError::Io(format!("{} worker: {}", self.slot, reason)));
        }
        Ok(())
    }

    fn cancel(&self) {
        if thread::current().id() == self.thread_id {
            warn!("Cancel of {} slot from its own completion, ignored", self.slot);
            return;
        }

        if self.shared.wait_quiescent() {
            debug!("{} slot quiescent", self.slot);
        }
    }

    fn shutdown(&self) {
        self.cancel();
        self.shared.state().closed = true;
        self.job_tx.close();

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("USB {} worker panicked", self.slot);
            }
        }
    }
}

fn run_worker(
    slot: TransferSlot,
    mut execute: Executor,
    shared: Arc<SlotShared>,
    job_rx: Receiver<Job>,
) {
    debug!("USB {} worker started", slot);

    while let Ok(job) = job_rx.recv_blocking() {
        let completion = execute(&job.request, &|| shared.is_cancelling());

        shared.begin_callback();
        // a panicking callback must not take the slot down with it
        let on_complete = job.on_complete;
        let result = catch_unwind(AssertUnwindSafe(move || on_complete(completion)));
        if let Err(e) = result {
            error!("Panic in {} completion handler: {:?}", slot, e);
        }
        shared.end_callback();
    }

    debug!("USB {} worker stopped", slot);
}

/// [`Transport`] over a claimed rusb device handle
pub struct UsbTransport {
    interrupt: SlotWorker,
    control: SlotWorker,
}

impl UsbTransport {
    /// Spawn one worker thread per slot
    pub fn new(
        handle: Arc<DeviceHandle<Context>>,
        timeouts: TransferTimeouts,
    ) -> std::io::Result<Self> {
        Ok(Self {
            interrupt: SlotWorker::spawn(
                TransferSlot::Interrupt,
                rusb_executor(Arc::clone(&handle), timeouts),
            )?,
            control: SlotWorker::spawn(TransferSlot::Control, rusb_executor(handle, timeouts))?,
        })
    }

    fn worker(&self, slot: TransferSlot) -> &SlotWorker {
        match slot {
            TransferSlot::Interrupt => &self.interrupt,
            TransferSlot::Control => &self.control,
        }
    }
}

impl Transport for UsbTransport {
    fn submit(
        &self,
        slot: TransferSlot,
        request: TransferRequest,
        alloc: AllocMode,
        on_complete: CompletionHandler,
    ) -> Result<(), SubmitError> {
        self.worker(slot).submit(request, alloc, on_complete)
    }

    fn cancel(&self, slot: TransferSlot) {
        self.worker(slot).cancel();
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.interrupt.shutdown();
        self.control.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::TransferStatus;
    use std::sync::mpsc;
    use std::time::Duration;

    const READ: TransferRequest = TransferRequest::Interrupt {
        endpoint: 0x81,
        length: 8,
    };
    const WAIT: Duration = Duration::from_secs(5);

    /// Reads that only end when cancelled, like an idle interrupt endpoint
    fn idle_endpoint() -> Executor {
        Box::new(|_: &TransferRequest, cancelled: &dyn Fn() -> bool| {
            while !cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Completion::failed(TransferStatus::Cancelled)
        })
    }

    /// Reads that complete immediately
    fn instant_reports() -> Executor {
        Box::new(|_: &TransferRequest, _: &dyn Fn() -> bool| {
            Completion::completed(vec![0xFF; 8])
        })
    }

    /// Reads that complete once the test opens the gate, ignoring cancels
    fn gated(gate: mpsc::Receiver<()>) -> Executor {
        Box::new(move |_: &TransferRequest, _: &dyn Fn() -> bool| {
            let _ = gate.recv();
            Completion::completed(vec![0xFF; 8])
        })
    }

    fn ignore() -> CompletionHandler {
        Box::new(|_| {})
    }

    fn wait_for_canceller(worker: &SlotWorker) {
        while !worker.shared.is_cancelling() {
            thread::yield_now();
        }
    }

    #[test]
    fn test_second_submit_is_busy() {
        let worker = SlotWorker::spawn(TransferSlot::Interrupt, idle_endpoint()).unwrap();

        worker.submit(READ, AllocMode::MayBlock, ignore()).unwrap();
        assert_eq!(
            worker.submit(READ, AllocMode::NoWait, ignore()),
            Err(SubmitError::Busy)
        );

        worker.shutdown();
    }

    #[test]
    fn test_cancel_waits_for_callback_and_is_idempotent() {
        let worker = SlotWorker::spawn(TransferSlot::Interrupt, idle_endpoint()).unwrap();
        let (tx, rx) = mpsc::channel();

        worker
            .submit(
                READ,
                AllocMode::MayBlock,
                Box::new(move |completion: Completion| tx.send(completion.status).unwrap()),
            )
            .unwrap();
        worker.cancel();

        assert_eq!(rx.try_recv(), Ok(TransferStatus::Cancelled));
        assert!(worker.shared.state().is_quiescent());

        worker.cancel();
        worker.submit(READ, AllocMode::MayBlock, ignore()).unwrap();
        worker.shutdown();
    }

    #[test]
    fn test_submit_rejected_while_cancel_waits() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let worker = Arc::new(SlotWorker::spawn(TransferSlot::Control, gated(gate_rx)).unwrap());

        worker.submit(READ, AllocMode::MayBlock, ignore()).unwrap();
        let canceller = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.cancel())
        };
        wait_for_canceller(&worker);

        assert_eq!(
            worker.submit(READ, AllocMode::NoWait, ignore()),
            Err(SubmitError::Rejected)
        );

        gate_tx.send(()).unwrap();
        canceller.join().unwrap();

        assert!(!worker.shared.is_cancelling());
        worker.submit(READ, AllocMode::MayBlock, ignore()).unwrap();
        gate_tx.send(()).unwrap();
        worker.shutdown();
    }

    #[test]
    fn test_resubmit_from_callback_rejected_during_cancel() {
        let worker = Arc::new(SlotWorker::spawn(TransferSlot::Interrupt, instant_reports()).unwrap());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (result_tx, result_rx) = mpsc::channel();

        let inner = Arc::clone(&worker);
        worker
            .submit(
                READ,
                AllocMode::MayBlock,
                Box::new(move |_| {
                    entered_tx.send(()).unwrap();
                    go_rx.recv().unwrap();
                    result_tx
                        .send(inner.submit(READ, AllocMode::NoWait, ignore()))
                        .unwrap();
                }),
            )
            .unwrap();
        entered_rx.recv_timeout(WAIT).unwrap();

        let canceller = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.cancel())
        };
        wait_for_canceller(&worker);
        go_tx.send(()).unwrap();
        canceller.join().unwrap();

        assert_eq!(result_rx.recv_timeout(WAIT).unwrap(), Err(SubmitError::Rejected));
        assert!(worker.shared.state().is_quiescent());
        worker.shutdown();
    }

    #[test]
    fn test_cancel_from_own_completion_is_ignored() {
        let worker = Arc::new(SlotWorker::spawn(TransferSlot::Control, instant_reports()).unwrap());
        let (tx, rx) = mpsc::channel();

        let inner = Arc::clone(&worker);
        worker
            .submit(
                READ,
                AllocMode::MayBlock,
                Box::new(move |_| {
                    inner.cancel();
                    tx.send(()).unwrap();
                }),
            )
            .unwrap();

        rx.recv_timeout(WAIT).unwrap();
        worker.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_is_no_device() {
        let worker = SlotWorker::spawn(TransferSlot::Interrupt, idle_endpoint()).unwrap();
        worker.submit(READ, AllocMode::MayBlock, ignore()).unwrap();

        worker.shutdown();

        assert_eq!(
            worker.submit(READ, AllocMode::MayBlock, ignore()),
            Err(SubmitError::NoDevice)
        );
    }

    #[test]
    fn test_failed_handoff_releases_slot() {
        let worker = SlotWorker::spawn(TransferSlot::Interrupt, instant_reports()).unwrap();
        worker.job_tx.close();

        for alloc in [AllocMode::NoWait, AllocMode::MayBlock] {
            let result = worker.submit(READ, alloc, ignore());
            assert!(matches!(result, Err(SubmitError::Io(_))), "{:?}", alloc);
            assert!(worker.shared.state().is_quiescent());
        }

        worker.shutdown();
    }

    #[test]
    fn test_panicking_callback_keeps_worker_alive() {
        let worker = SlotWorker::spawn(TransferSlot::Interrupt, instant_reports()).unwrap();
        let (tx, rx) = mpsc::channel();

        worker
            .submit(READ, AllocMode::MayBlock, Box::new(|_| panic!("handler bug")))
            .unwrap();
        worker.cancel();

        worker
            .submit(
                READ,
                AllocMode::MayBlock,
                Box::new(move |completion: Completion| tx.send(completion.status).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(TransferStatus::Completed));
        worker.shutdown();
    }

    #[test]
    fn test_resubmit_from_callback_keeps_slot_busy() {
        let shared = SlotShared::default();
        shared.state().pending = true;

        shared.begin_callback();
        assert!(!shared.state().is_quiescent());
        shared.state().pending = true;
        shared.end_callback();

        assert!(!shared.state().is_quiescent());
    }

    #[test]
    fn test_quiet_slot_does_not_wait() {
        let shared = SlotShared::default();
        assert!(!shared.wait_quiescent());
        assert!(!shared.is_cancelling());
    }

    #[test]
    fn test_callback_end_wakes_canceller() {
        let shared = Arc::new(SlotShared::default());
        shared.state().pending = true;

        let canceller = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.wait_quiescent())
        };
        while !shared.is_cancelling() {
            thread::yield_now();
        }

        shared.begin_callback();
        shared.end_callback();

        assert!(canceller.join().unwrap());
        assert!(!shared.is_cancelling());
    }
}
