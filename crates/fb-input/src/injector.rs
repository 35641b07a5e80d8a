//! Event frame construction and injection.
//!
//! Each pointer update becomes exactly one frame: axis events first, then
//! button transitions, then the `SYN_REPORT` appended by the sink.

use evdev::{AbsoluteAxisType, EventType, InputEvent, Key, RelativeAxisType};

use crate::device::{AxisRange, EventSink};
use crate::error::InputError;
use crate::rotation::{Rotation, ScreenGeometry};

/// Remote button state, one bit per button (VNC/RFB layout).
///
/// Bits 0-2 are left/middle/right, bits 3/4 wheel up/down and bits 5/6
/// horizontal wheel left/right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const LEFT: u8 = 1 << 0;
    pub const MIDDLE: u8 = 1 << 1;
    pub const RIGHT: u8 = 1 << 2;
    pub const WHEEL_UP: u8 = 1 << 3;
    pub const WHEEL_DOWN: u8 = 1 << 4;
    pub const WHEEL_LEFT: u8 = 1 << 5;
    pub const WHEEL_RIGHT: u8 = 1 << 6;

    #[must_use]
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Build from the protocol's integer mask; only the low 8 bits count.
    #[must_use]
    pub const fn from_raw(mask: i32) -> Self {
        Self((mask & 0xFF) as u8)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Buttons whose state differs from `previous`, lowest bit first,
    /// paired with their new pressed state.
    pub fn transitions(self, previous: Self) -> impl Iterator<Item = (u8, bool)> {
        let changed = self.0 ^ previous.0;
        (0..8)
            .map(|bit| 1u8 << bit)
            .filter(move |button| changed & button != 0)
            .map(move |button| (button, self.0 & button != 0))
    }
}

/// Absolute-mode target: the panel geometry positions are mapped in,
/// and the device axes they are finally scaled onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteTarget {
    pub geometry: ScreenGeometry,
    pub rotation: Rotation,
    pub x_axis: AxisRange,
    pub y_axis: AxisRange,
    /// Key reported while button 0 is held.
    pub contact: Key,
}

impl AbsoluteTarget {
    /// Rotate, clamp and scale a position onto the device axes.
    #[must_use]
    pub fn device_position(&self, x: i32, y: i32) -> (i32, i32) {
        let (mx, my) = self.rotation.map_position(self.geometry, x, y);
        (
            self.x_axis.scale(mx, self.geometry.width()),
            self.y_axis.scale(my, self.geometry.height()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionMode {
    /// Touch-like positions on an existing absolute device.
    Absolute(AbsoluteTarget),
    /// Mouse-like deltas on a virtual pointer. Deltas arrive already
    /// rotated.
    Relative,
}

/// Writes pointer frames to one device and remembers the last button
/// mask it committed.
pub struct Injector {
    sink: Box<dyn EventSink>,
    mode: InjectionMode,
    last_mask: ButtonMask,
    frames: u64,
    failed_frames: u64,
}

impl Injector {
    #[must_use]
    pub fn new(sink: Box<dyn EventSink>, mode: InjectionMode) -> Self {
        Self {
            sink,
            mode,
            last_mask: ButtonMask::default(),
            frames: 0,
            failed_frames: 0,
        }
    }

    /// Button mask of the last successfully committed frame.
    #[must_use]
    pub const fn last_mask(&self) -> ButtonMask {
        self.last_mask
    }

    /// Number of frames the device rejected since creation.
    #[must_use]
    pub const fn failed_frames(&self) -> u64 {
        self.failed_frames
    }

    /// Inject one pointer update.
    ///
    /// In absolute mode `(x, y)` is a panel position; in relative mode it
    /// is a motion delta. A failed write leaves the retained button mask
    /// untouched so the next call retries the same transitions.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Injection`] if the device rejects the frame.
    pub fn inject(&mut self, mask: ButtonMask, x: i32, y: i32) -> Result<(), InputError> {
        let events = self.frame(mask, x, y);
        match self.sink.commit(&events) {
            Ok(()) => {
                self.last_mask = mask;
                self.frames += 1;
                tracing::trace!(
                    device = self.sink.describe(),
                    buttons = mask.bits(),
                    x,
                    y,
                    events = events.len(),
                    "Injected pointer frame"
                );
                Ok(())
            }
            Err(e) => {
                self.failed_frames += 1;
                tracing::warn!(
                    device = self.sink.describe(),
                    failed_frames = self.failed_frames,
                    error = %e,
                    "Pointer injection failed"
                );
                Err(InputError::Injection(e))
            }
        }
    }

    /// Release the device.
    pub fn close(self) {
        tracing::info!(
            device = self.sink.describe(),
            frames = self.frames,
            failed_frames = self.failed_frames,
            "Closing pointer device"
        );
    }

    fn frame(&self, mask: ButtonMask, x: i32, y: i32) -> Vec<InputEvent> {
        let mut events = Vec::with_capacity(6);
        match &self.mode {
            InjectionMode::Absolute(target) => {
                let (dx, dy) = target.device_position(x, y);
                events.push(abs_event(AbsoluteAxisType::ABS_X, dx));
                events.push(abs_event(AbsoluteAxisType::ABS_Y, dy));
                for (button, pressed) in mask.transitions(self.last_mask) {
                    if button == ButtonMask::LEFT {
                        events.push(key_event(target.contact, pressed));
                    }
                }
            }
            InjectionMode::Relative => {
                if x != 0 {
                    events.push(rel_event(RelativeAxisType::REL_X, x));
                }
                if y != 0 {
                    events.push(rel_event(RelativeAxisType::REL_Y, y));
                }
                for (button, pressed) in mask.transitions(self.last_mask) {
                    if let Some(event) = relative_button_event(button, pressed) {
                        events.push(event);
                    }
                }
            }
        }
        events
    }
}

/// Map a relative-mode button transition. Wheel bits produce one notch
/// on press and nothing on release.
fn relative_button_event(button: u8, pressed: bool) -> Option<InputEvent> {
    match button {
        ButtonMask::LEFT => Some(key_event(Key::BTN_LEFT, pressed)),
        ButtonMask::MIDDLE => Some(key_event(Key::BTN_MIDDLE, pressed)),
        ButtonMask::RIGHT => Some(key_event(Key::BTN_RIGHT, pressed)),
        ButtonMask::WHEEL_UP if pressed => Some(rel_event(RelativeAxisType::REL_WHEEL, 1)),
        ButtonMask::WHEEL_DOWN if pressed => Some(rel_event(RelativeAxisType::REL_WHEEL, -1)),
        ButtonMask::WHEEL_LEFT if pressed => Some(rel_event(RelativeAxisType::REL_HWHEEL, -1)),
        ButtonMask::WHEEL_RIGHT if pressed => Some(rel_event(RelativeAxisType::REL_HWHEEL, 1)),
        _ => None,
    }
}

fn abs_event(axis: AbsoluteAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::ABSOLUTE, axis.0, value)
}

fn rel_event(axis: RelativeAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::RELATIVE, axis.0, value)
}

fn key_event(key: Key, pressed: bool) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), i32::from(pressed))
}
