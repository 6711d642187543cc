//! Async channel bridge between the completion context and event consumers
//!
//! Completion callbacks run on USB worker threads and must never block, so
//! the sink side only ever uses `try_send`. The consumer side can be awaited
//! from Tokio or drained from a plain thread.

use async_channel::{Receiver, Sender, TrySendError, bounded};
use protocol::{Axis, Button, InputEvent, InputFrame};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

use crate::sink::EventSink;

/// Default number of frames buffered between sink and consumer
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Default)]
struct FrameState {
    /// Events collected since the last flush
    pending: Vec<InputEvent>,
    /// Button states of delivered frames; absent means released
    buttons: HashMap<Button, bool>,
    /// Axis values of delivered frames; absent means never reported
    axes: HashMap<Axis, i32>,
    /// Changes in `pending`, committed once the frame is queued
    staged_buttons: HashMap<Button, bool>,
    staged_axes: HashMap<Axis, i32>,
    next_seq: u64,
}

impl FrameState {
    fn button(&self, button: Button) -> bool {
        self.staged_buttons
            .get(&button)
            .or_else(|| self.buttons.get(&button))
            .copied()
            .unwrap_or(false)
    }

    fn axis(&self, axis: Axis) -> Option<i32> {
        self.staged_axes
            .get(&axis)
            .or_else(|| self.axes.get(&axis))
            .copied()
    }

    fn commit(&mut self) {
        self.buttons.extend(self.staged_buttons.drain());
        self.axes.extend(self.staged_axes.drain());
    }

    fn discard(&mut self) {
        self.staged_buttons.clear();
        self.staged_axes.clear();
    }
}

/// Sink half of the bridge
///
/// Forwards only values that differ from what the consumer has been sent and
/// delivers them as one [`InputFrame`] per flush. A frame that does not fit
/// in the queue is dropped; its sequence number is skipped so consumers can
/// notice the gap, and its changes are forwarded again by the next report
/// that still carries them.
pub struct ChannelSink {
    frame_tx: Sender<InputFrame>,
    state: Mutex<FrameState>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Number of frames dropped because the queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for ChannelSink {
    fn publish_button(&self, button: Button, pressed: bool) {
        let mut state = self.state();
        if state.button(button) != pressed {
            state.staged_buttons.insert(button, pressed);
            state.pending.push(InputEvent::Button { button, pressed });
        }
    }

    fn publish_axis(&self, axis: Axis, value: i32) {
        let mut state = self.state();
        if state.axis(axis) != Some(value) {
            state.staged_axes.insert(axis, value);
            state.pending.push(InputEvent::Axis { axis, value });
        }
    }

    fn flush_frame(&self) {
        let mut state = self.state();
        if state.pending.is_empty() {
            return;
        }

        let frame = InputFrame {
            seq: state.next_seq,
            timestamp_us: now_us(),
            events: std::mem::take(&mut state.pending),
        };
        state.next_seq += 1;

        match self.frame_tx.try_send(frame) {
            Ok(()) => {
                state.commit();
                trace!("Queued input frame seq={}", state.next_seq - 1);
            }
            Err(TrySendError::Full(frame)) => {
                state.discard();
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Event queue full, dropped frame seq={} with {} events (total dropped: {})",
                    frame.seq,
                    frame.events.len(),
                    total
                );
            }
            Err(TrySendError::Closed(frame)) => {
                state.discard();
                debug!("Event consumer gone, discarding frame seq={}", frame.seq);
            }
        }
    }
}

/// Consumer half of the bridge
#[derive(Clone)]
pub struct EventStream {
    frame_rx: Receiver<InputFrame>,
}

impl EventStream {
    /// Wait for the next frame
    pub async fn recv_frame(&self) -> crate::Result<InputFrame> {
        self.frame_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Wait for the next frame, blocking the current thread
    pub fn recv_frame_blocking(&self) -> crate::Result<InputFrame> {
        self.frame_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take a frame if one is queued
    pub fn try_recv_frame(&self) -> Option<InputFrame> {
        self.frame_rx.try_recv().ok()
    }

    /// Number of frames waiting
    pub fn len(&self) -> usize {
        self.frame_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_rx.is_empty()
    }
}

/// Create the bridge between the completion context and a consumer
///
/// Returns (ChannelSink for the driver, EventStream for the consumer)
pub fn create_event_bridge(capacity: usize) -> (ChannelSink, EventStream) {
    let (frame_tx, frame_rx) = bounded(capacity.max(1));

    (
        ChannelSink {
            frame_tx,
            state: Mutex::new(FrameState::default()),
            dropped: AtomicU64::new(0),
        },
        EventStream { frame_rx },
    )
}

fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
