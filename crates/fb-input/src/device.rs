//! Input device handles.
//!
//! Two concrete handles exist: [`TouchDevice`], an existing evdev node
//! (e.g. `/dev/input/event0`) that events are written back into, and
//! [`VirtualPointer`], a uinput mouse created for relative motion. Both
//! implement [`EventSink`], which is the only thing the injector talks to.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsoluteAxisType, AttributeSet, Device, EventType, InputEvent, Key, RelativeAxisType,
    Synchronization,
};
use rustix::event::{PollFd, PollFlags};

use crate::error::InputError;

/// Kernel node used to create virtual devices.
const UINPUT_PATH: &str = "/dev/uinput";

/// Destination for input event frames.
pub trait EventSink: Send {
    /// Write `events` followed by exactly one `SYN_REPORT`.
    ///
    /// An empty slice still commits an (empty) frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the device rejects the write,
    /// has gone away, or does not become writable in time.
    fn commit(&mut self, events: &[InputEvent]) -> io::Result<()>;

    /// Human-readable identity for logs.
    fn describe(&self) -> &str;
}

/// Inclusive value range of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

impl AxisRange {
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Number of distinct values on the axis.
    #[must_use]
    pub fn extent(self) -> u32 {
        let span = i64::from(self.max) - i64::from(self.min) + 1;
        u32::try_from(span.max(0)).unwrap_or(u32::MAX)
    }

    /// Scale `value` from `[0, extent - 1]` onto this axis, clamped.
    #[must_use]
    // bounded by [min, max], both of which came from i32
    #[allow(clippy::cast_possible_truncation)]
    pub fn scale(self, value: i32, extent: u32) -> i32 {
        let min = i64::from(self.min);
        let max = i64::from(self.max);
        if max <= min {
            return self.min;
        }
        let scaled = if extent > 1 {
            min + i64::from(value) * (max - min) / (i64::from(extent) - 1)
        } else {
            min
        };
        scaled.clamp(min, max) as i32
    }
}

/// An existing absolute-positioning device (touchscreen, tablet) that
/// synthetic events are written into.
pub struct TouchDevice {
    device: Device,
    label: String,
    x_axis: AxisRange,
    y_axis: AxisRange,
    contact: Key,
    write_timeout: Duration,
}

impl TouchDevice {
    /// Open `path` and read its absolute axis ranges.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::DeviceOpen`] if the node cannot be opened and
    /// [`InputError::Capability`] if it lacks `ABS_X`/`ABS_Y` or a
    /// contact button (`BTN_TOUCH` or `BTN_LEFT`).
    pub fn open(path: &Path, write_timeout: Duration) -> Result<Self, InputError> {
        let device = Device::open(path).map_err(|source| InputError::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let label = match device.name() {
            Some(name) => format!("{} ({name})", path.display()),
            None => path.display().to_string(),
        };

        let has_axes = device.supported_absolute_axes().is_some_and(|axes| {
            axes.contains(AbsoluteAxisType::ABS_X) && axes.contains(AbsoluteAxisType::ABS_Y)
        });
        if !has_axes {
            return Err(InputError::Capability {
                device: label,
                missing: "absolute ABS_X/ABS_Y axes".to_string(),
            });
        }

        let contact = match device.supported_keys() {
            Some(keys) if keys.contains(Key::BTN_TOUCH) => Key::BTN_TOUCH,
            Some(keys) if keys.contains(Key::BTN_LEFT) => Key::BTN_LEFT,
            _ => {
                return Err(InputError::Capability {
                    device: label,
                    missing: "a BTN_TOUCH or BTN_LEFT contact button".to_string(),
                })
            }
        };

        let abs = device.get_abs_state().map_err(|e| InputError::Capability {
            device: label.clone(),
            missing: format!("readable absolute axis info ({e})"),
        })?;
        let x = abs[AbsoluteAxisType::ABS_X.0 as usize];
        let y = abs[AbsoluteAxisType::ABS_Y.0 as usize];
        let x_axis = AxisRange::new(x.minimum, x.maximum);
        let y_axis = AxisRange::new(y.minimum, y.maximum);

        tracing::info!(
            device = %label,
            x_min = x_axis.min,
            x_max = x_axis.max,
            y_min = y_axis.min,
            y_max = y_axis.max,
            contact = ?contact,
            "Opened touch device"
        );

        Ok(Self {
            device,
            label,
            x_axis,
            y_axis,
            contact,
            write_timeout,
        })
    }

    #[must_use]
    pub const fn x_axis(&self) -> AxisRange {
        self.x_axis
    }

    #[must_use]
    pub const fn y_axis(&self) -> AxisRange {
        self.y_axis
    }

    /// Button reported while a contact is down.
    #[must_use]
    pub const fn contact(&self) -> Key {
        self.contact
    }
}

impl EventSink for TouchDevice {
    fn commit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        // evdev 0.12 `Device` implements `AsRawFd` but not `AsFd`, so the
        // descriptor has to be borrowed by hand; drop this once it does.
        // SAFETY: the descriptor is owned by `self.device`, which outlives
        // this borrow.
        let fd = unsafe { BorrowedFd::borrow_raw(self.device.as_raw_fd()) };
        wait_writable(fd, self.write_timeout)?;

        let mut frame = Vec::with_capacity(events.len() + 1);
        frame.extend_from_slice(events);
        frame.push(syn_report());
        self.device.send_events(&frame)
    }

    fn describe(&self) -> &str {
        &self.label
    }
}

/// A uinput mouse reporting relative motion, wheels and three buttons.
pub struct VirtualPointer {
    device: VirtualDevice,
    name: String,
}

impl VirtualPointer {
    /// Create the virtual device through `/dev/uinput`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::DeviceOpen`] if uinput is unavailable and
    /// [`InputError::Capability`] if the kernel refuses the requested
    /// axes or buttons.
    pub fn create(name: &str) -> Result<Self, InputError> {
        let capability = |missing: &str| {
            let device = name.to_string();
            let missing = missing.to_string();
            move |e: io::Error| InputError::Capability {
                device,
                missing: format!("{missing} ({e})"),
            }
        };

        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_LEFT);
        keys.insert(Key::BTN_RIGHT);
        keys.insert(Key::BTN_MIDDLE);

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);
        axes.insert(RelativeAxisType::REL_HWHEEL);

        let device = VirtualDeviceBuilder::new()
            .map_err(|source| InputError::DeviceOpen {
                path: PathBuf::from(UINPUT_PATH),
                source,
            })?
            .name(name)
            .with_keys(&keys)
            .map_err(capability("mouse buttons"))?
            .with_relative_axes(&axes)
            .map_err(capability("relative axes"))?
            .build()
            .map_err(capability("virtual device creation"))?;

        tracing::info!(name, "Created virtual relative pointer");

        Ok(Self {
            device,
            name: name.to_string(),
        })
    }
}

impl EventSink for VirtualPointer {
    fn commit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        // `emit` terminates the batch with SYN_REPORT itself.
        self.device.emit(events)
    }

    fn describe(&self) -> &str {
        &self.name
    }
}

/// The frame terminator.
#[must_use]
pub fn syn_report() -> InputEvent {
    InputEvent::new(
        EventType::SYNCHRONIZATION,
        Synchronization::SYN_REPORT.0,
        0,
    )
}

/// Wait until `fd` accepts a write, bounded by `timeout`.
fn wait_writable(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<()> {
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    let mut fds = [PollFd::new(&fd, PollFlags::OUT)];
    let ready = rustix::event::poll(&mut fds, timeout_ms)?;
    if ready == 0 {
        return Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("device not writable after {timeout_ms} ms"),
        ));
    }
    if fds[0]
        .revents()
        .intersects(PollFlags::ERR | PollFlags::HUP | PollFlags::NVAL)
    {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device hung up",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::fd::{AsFd, OwnedFd};
    use std::time::Instant;

    use rustix::io::Errno;
    use rustix::pipe::{pipe_with, PipeFlags};

    use super::*;

    #[test]
    fn scale_is_identity_when_axis_matches_extent() {
        let axis = AxisRange::new(0, 479);
        assert_eq!(axis.extent(), 480);
        for v in [0, 1, 240, 479] {
            assert_eq!(axis.scale(v, 480), v);
        }
    }

    #[test]
    fn scale_maps_onto_device_range() {
        let axis = AxisRange::new(200, 3900);
        assert_eq!(axis.scale(0, 480), 200);
        assert_eq!(axis.scale(479, 480), 3900);
        let mid = axis.scale(240, 480);
        assert!((2040..=2060).contains(&mid), "mid = {mid}");
    }

    #[test]
    fn scale_clamps_out_of_range_values() {
        let axis = AxisRange::new(0, 4095);
        assert_eq!(axis.scale(-10, 480), 0);
        assert_eq!(axis.scale(10_000, 480), 4095);
    }

    #[test]
    fn degenerate_axis_pins_to_min() {
        let axis = AxisRange::new(5, 5);
        assert_eq!(axis.scale(100, 480), 5);
        assert_eq!(AxisRange::new(10, 0).extent(), 0);
    }

    #[test]
    fn single_pixel_extent_pins_to_min() {
        assert_eq!(AxisRange::new(0, 100).scale(0, 1), 0);
    }

    #[test]
    fn touch_open_missing_path_is_device_open_error() {
        let err = TouchDevice::open(
            Path::new("/nonexistent/fb-input/event99"),
            Duration::from_millis(10),
        )
        .err()
        .unwrap();
        assert!(matches!(err, InputError::DeviceOpen { .. }));
        assert_eq!(err.code(), -1);
    }

    fn full_pipe() -> (OwnedFd, OwnedFd) {
        let (reader, writer) = pipe_with(PipeFlags::NONBLOCK).unwrap();
        let chunk = [0u8; 4096];
        loop {
            match rustix::io::write(&writer, &chunk) {
                Ok(_) => {}
                Err(Errno::AGAIN) => break,
                Err(e) => panic!("filling pipe: {e}"),
            }
        }
        (reader, writer)
    }

    #[test]
    fn stalled_device_times_out() {
        let (_reader, writer) = full_pipe();
        let start = Instant::now();
        let err = wait_writable(writer.as_fd(), Duration::from_millis(30)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn hung_up_device_is_broken_pipe() {
        let (reader, writer) = full_pipe();
        drop(reader);
        let err = wait_writable(writer.as_fd(), Duration::from_millis(30)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn writable_device_passes() {
        let (_reader, writer) = pipe_with(PipeFlags::NONBLOCK).unwrap();
        wait_writable(writer.as_fd(), Duration::from_millis(30)).unwrap();
    }

    #[test]
    fn syn_report_is_sync_event() {
        let ev = syn_report();
        assert_eq!(ev.event_type(), EventType::SYNCHRONIZATION);
        assert_eq!(ev.code(), Synchronization::SYN_REPORT.0);
    }
}
