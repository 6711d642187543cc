//! Input event sink capability

use protocol::{Axis, Button};

/// Receiver of decoded input state
///
/// Called from transfer completion context, so implementations must not
/// block for longer than a short critical section.
pub trait EventSink: Send + Sync {
    /// Report the current state of a button
    fn publish_button(&self, button: Button, pressed: bool);

    /// Report the current value of an absolute axis
    fn publish_axis(&self, axis: Axis, value: i32);

    /// Mark the end of one completion's worth of updates
    fn flush_frame(&self);
}
