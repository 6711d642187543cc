//! Per-device session and its lifecycle
//!
//! A [`DeviceSession`] is built once per attached flightstick and owns the
//! interrupt stream and the control poll chain. Lifecycle entry points are
//! serialized by one lock. Completion callbacks never take it and rely on
//! the transport's blocking `cancel` instead.
//!
//! ```text
//!   CLOSED --open--> OPEN --close--> CLOSED
//!                     |  ^
//!              suspend|  |resume / reset-resume / post-reset
//!                     v  |
//!                  OPEN+SUSPENDED
//! ```

use common::{AllocMode, EventSink, SubmitError, Transport};
use protocol::PollPhase;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MappingSettings;
use crate::log_submit_error;
use crate::poll::ControlPollChain;
use crate::publish::Publisher;
use crate::stats::TransferStats;
use crate::stream::InterruptStream;
use crate::usb::InterruptEndpoint;

/// Failure of a lifecycle entry point
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The interrupt read could not be submitted
    #[error("I/O error: {0}")]
    Io(#[source] SubmitError),
}

/// Why the host is suspending the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// Runtime power management, the device was idle
    Auto,
    /// System-wide sleep
    System,
}

#[derive(Debug, Default)]
struct Lifecycle {
    is_open: bool,
    suspended: bool,
}

/// Holds the lifecycle lock between [`DeviceSession::pre_reset`] and
/// [`DeviceSession::post_reset`]
#[must_use = "dropping the window without post_reset leaves the transfers stopped"]
pub struct ResetWindow<'a> {
    session: &'a DeviceSession,
    lifecycle: MutexGuard<'a, Lifecycle>,
}

/// One attached flightstick
pub struct DeviceSession {
    lifecycle: Mutex<Lifecycle>,
    stream: InterruptStream,
    poll: ControlPollChain,
    publisher: Arc<Publisher>,
}

impl DeviceSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        endpoint: InterruptEndpoint,
        mapping: MappingSettings,
    ) -> Self {
        let publisher = Arc::new(Publisher::new(sink, mapping));
        Self {
            lifecycle: Mutex::new(Lifecycle::default()),
            stream: InterruptStream::new(Arc::clone(&transport), Arc::clone(&publisher), endpoint),
            poll: ControlPollChain::new(transport, Arc::clone(&publisher)),
            publisher,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start reporting
    ///
    /// Arms the interrupt read, then starts the poll chain at phase A. Failing
    /// to arm the read fails the open; failing to start the chain only logs.
    /// Opening an open session succeeds without touching the transfers.
    pub fn open(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.lock();
        if lifecycle.is_open {
            debug!("Session already open");
            return Ok(());
        }

        self.stream.arm(AllocMode::MayBlock).map_err(|e| {
            log_submit_error("interrupt arm", &e);
            SessionError::Io(e)
        })?;
        lifecycle.is_open = true;
        lifecycle.suspended = false;

        if let Err(e) = self.poll.start(AllocMode::MayBlock) {
            warn!("Poll chain did not start: {}", e);
        }

        info!(
            "Session open on endpoint 0x{:02x}",
            self.stream.endpoint().address
        );
        Ok(())
    }

    /// Stop reporting and wait until no callback is running
    pub fn close(&self) {
        let mut lifecycle = self.lock();
        self.cancel_transfers();
        lifecycle.is_open = false;
        lifecycle.suspended = false;
        info!("Session closed");
    }

    /// Stop the transfers but remember the session was open
    pub fn suspend(&self, reason: SuspendReason) {
        let mut lifecycle = self.lock();
        if !lifecycle.is_open {
            debug!("Suspend ({:?}) on closed session", reason);
            return;
        }

        self.cancel_transfers();
        lifecycle.suspended = true;
        info!("Session suspended ({:?})", reason);
    }

    /// Restart the transfers of an open session
    pub fn resume(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.lock();
        self.restart(&mut lifecycle)
    }

    /// Resume after the device was reset while suspended
    pub fn reset_resume(&self) -> Result<(), SessionError> {
        self.resume()
    }

    /// Stop the transfers ahead of a device reset
    ///
    /// The lifecycle lock stays held until the returned window is passed to
    /// [`post_reset`](Self::post_reset).
    pub fn pre_reset(&self) -> ResetWindow<'_> {
        let lifecycle = self.lock();
        self.cancel_transfers();
        debug!("Entering reset window");
        ResetWindow {
            session: self,
            lifecycle,
        }
    }

    /// Restart the transfers after a device reset and release the lock
    pub fn post_reset(&self, window: ResetWindow<'_>) -> Result<(), SessionError> {
        debug_assert!(
            std::ptr::eq(self, window.session),
            "reset window belongs to another session"
        );
        let ResetWindow {
            session,
            mut lifecycle,
        } = window;
        debug!("Leaving reset window");
        session.restart(&mut lifecycle)
    }

    /// Re-arm the read and restart the chain at phase A
    ///
    /// The chain restarts even when the read cannot be armed; the arm result
    /// is what gets reported.
    fn restart(&self, lifecycle: &mut Lifecycle) -> Result<(), SessionError> {
        if !lifecycle.is_open {
            debug!("Session not open, nothing to restart");
            return Ok(());
        }
        lifecycle.suspended = false;

        let armed = if self.stream.is_armed() {
            Ok(())
        } else {
            self.stream.arm(AllocMode::MayBlock)
        };
        if let Err(e) = &armed {
            log_submit_error("interrupt re-arm", e);
        }

        // a chain that is still running would be mid-cycle, start over at A
        self.poll.stop();
        if let Err(e) = self.poll.start(AllocMode::MayBlock) {
            log_submit_error("poll restart", &e);
        }

        armed.map_err(SessionError::Io)
    }

    fn cancel_transfers(&self) {
        self.stream.cancel();
        self.poll.stop();
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().suspended
    }

    pub fn stream_armed(&self) -> bool {
        self.stream.is_armed()
    }

    pub fn poll_running(&self) -> bool {
        self.poll.is_running()
    }

    pub fn poll_phase(&self) -> PollPhase {
        self.poll.phase()
    }

    pub fn mapping(&self) -> &MappingSettings {
        self.publisher.mapping()
    }

    /// Counters of the interrupt stream and the poll chain
    pub fn stats(&self) -> (TransferStats, TransferStats) {
        (self.stream.stats(), self.poll.stats())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        // completion closures hold the stream and chain state alive
        self.cancel_transfers();
    }
}
