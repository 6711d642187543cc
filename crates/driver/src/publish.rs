//! Translation of decoded reports into input events
//!
//! Every decoded field is forwarded on each completion; suppressing
//! unchanged values is the sink's business. Each report ends with exactly one
//! `flush_frame`, and the whole publish/flush sequence runs under a frame
//! lock so the interrupt and control completion contexts cannot interleave
//! their updates inside one frame.

use common::EventSink;
use protocol::{Axis, Button, InterruptReport, ModeSelect, Pad, PollAReport, PollBReport};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use crate::config::{MappingSettings, PadMode};

/// Axes carried by the interrupt report, in wire order
const INTERRUPT_AXES: [Axis; 6] = [
    Axis::X,
    Axis::Y,
    Axis::Rudder,
    Axis::Rx,
    Axis::Ry,
    Axis::Throttle,
];

/// One pad's event identifiers in either mode
struct PadLayout {
    /// top, right, bottom, left
    buttons: [Button; 4],
    /// (left/right, top/bottom)
    axes: (Axis, Axis),
}

const PAD1: PadLayout = PadLayout {
    buttons: [
        Button::TriggerHappy5,
        Button::TriggerHappy6,
        Button::TriggerHappy7,
        Button::TriggerHappy8,
    ],
    axes: (Axis::TiltX, Axis::TiltY),
};

const PAD2: PadLayout = PadLayout {
    buttons: [Button::Tr, Button::Mode, Button::Z, Button::Tl],
    axes: (Axis::Z, Axis::Rz),
};

/// Selector position to button, in detent order M1, M2, M3
const MODE_BUTTONS: [(ModeSelect, Button); 3] = [
    (ModeSelect::M1, Button::GearUp),
    (ModeSelect::M2, Button::Base),
    (ModeSelect::M3, Button::GearDown),
];

/// Publishes decoded reports to an [`EventSink`]
pub struct Publisher {
    sink: Arc<dyn EventSink>,
    mapping: MappingSettings,
    frame: Mutex<()>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn EventSink>, mapping: MappingSettings) -> Self {
        Self {
            sink,
            mapping,
            frame: Mutex::new(()),
        }
    }

    pub fn mapping(&self) -> &MappingSettings {
        &self.mapping
    }

    /// Six raw axes, then buttons A and B
    pub fn interrupt(&self, report: &InterruptReport) {
        self.frame(|sink| {
            for (axis, value) in INTERRUPT_AXES.iter().zip(report.axes()) {
                sink.publish_axis(*axis, i32::from(value));
            }
            sink.publish_button(Button::A, report.button_a);
            sink.publish_button(Button::B, report.button_b);
        });
    }

    pub fn poll_a(&self, report: &PollAReport) {
        self.frame(|sink| {
            sink.publish_button(Button::TriggerHappy1, report.fire_c);
            sink.publish_button(Button::TriggerHappy2, report.button_d);
            sink.publish_button(Button::TriggerHappy3, report.hat_press);
            sink.publish_button(Button::TriggerHappy4, report.button_st);
            publish_pad(sink, &report.pad1, self.mapping.pad1, &PAD1);
            sink.publish_button(Button::Thumb, report.launch);
            sink.publish_button(Button::Trigger, report.trigger);
        });
    }

    pub fn poll_b(&self, report: &PollBReport) {
        self.frame(|sink| {
            sink.publish_button(Button::Thumb2, report.pad3_right);
            sink.publish_button(Button::C, report.pad3_middle);
            sink.publish_button(Button::X, report.pad3_left);
            sink.publish_button(Button::Y, report.button_sw1);
            if self.mapping.report_mode_select {
                for (position, button) in MODE_BUTTONS {
                    sink.publish_button(button, report.mode == position);
                }
            }
            publish_pad(sink, &report.pad2, self.mapping.pad2, &PAD2);
        });
    }

    fn frame<F: FnOnce(&dyn EventSink)>(&self, publish: F) {
        let _frame = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        publish(self.sink.as_ref());
        self.sink.flush_frame();
    }
}

fn publish_pad(sink: &dyn EventSink, pad: &Pad, mode: PadMode, layout: &PadLayout) {
    match mode {
        PadMode::Buttons => {
            let [top, right, bottom, left] = layout.buttons;
            sink.publish_button(top, pad.top);
            sink.publish_button(right, pad.right);
            sink.publish_button(bottom, pad.bottom);
            sink.publish_button(left, pad.left);
        }
        PadMode::Axes => {
            let (horizontal, vertical) = layout.axes;
            sink.publish_axis(horizontal, i32::from(pad.horizontal()));
            sink.publish_axis(vertical, i32::from(pad.vertical()));
        }
    }
}

/// Events a host has to register before forwarding frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub buttons: Vec<Button>,
    pub axes: Vec<(Axis, RangeInclusive<i32>)>,
}

/// Buttons and axes the publisher can emit under `mapping`
pub fn capabilities(mapping: &MappingSettings) -> Capabilities {
    let mut buttons = vec![
        Button::A,
        Button::B,
        Button::TriggerHappy1,
        Button::TriggerHappy2,
        Button::TriggerHappy3,
        Button::TriggerHappy4,
        Button::Thumb,
        Button::Trigger,
        Button::Thumb2,
        Button::C,
        Button::X,
        Button::Y,
    ];
    let mut axes: Vec<Axis> = INTERRUPT_AXES.to_vec();

    for (mode, layout) in [(mapping.pad1, &PAD1), (mapping.pad2, &PAD2)] {
        match mode {
            PadMode::Buttons => buttons.extend(layout.buttons),
            PadMode::Axes => axes.extend([layout.axes.0, layout.axes.1]),
        }
    }
    if mapping.report_mode_select {
        buttons.extend(MODE_BUTTONS.iter().map(|(_, button)| *button));
    }

    buttons.sort_unstable();
    Capabilities {
        buttons,
        axes: axes.into_iter().map(|axis| (axis, axis.range())).collect(),
    }
}
