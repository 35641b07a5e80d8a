//! Mode selection and pointer device lifecycle.
//!
//! A [`PointerBridge`] owns at most one active device. It is initialized
//! once in either absolute or relative mode, fed remote pointer updates,
//! and torn down with [`PointerBridge::cleanup_mouse`]. Re-initializing
//! without a cleanup in between is rejected, and so is initializing a
//! second bridge while another one in the process holds a device.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{BridgeConfig, PointerMode};
use crate::device::{AxisRange, EventSink, TouchDevice, VirtualPointer};
use crate::error::InputError;
use crate::injector::{AbsoluteTarget, ButtonMask, InjectionMode, Injector};
use crate::rotation::{Rotation, ScreenGeometry};

/// Settings applied when a device is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Panel geometry for absolute mode. When `None`, the touch device's
    /// own axis extent is used.
    pub geometry: Option<ScreenGeometry>,
    /// Name given to the virtual pointer in relative mode.
    pub device_name: String,
    /// Bound on waiting for a touch device to accept a frame.
    pub write_timeout: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for DeviceOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            geometry: config.geometry,
            device_name: config.device_name.clone(),
            write_timeout: config.write_timeout(),
        }
    }
}

/// Set while some bridge in the process holds a device.
static DEVICE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// The process-wide right to hold a pointer device. Released on drop.
struct DeviceClaim;

impl DeviceClaim {
    fn acquire() -> Result<Self, InputError> {
        DEVICE_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| {
                tracing::warn!("Another pointer bridge already holds a device");
                InputError::AlreadyInitialized
            })
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        DEVICE_CLAIMED.store(false, Ordering::Release);
    }
}

/// Geometry for absolute mode: the configured one, otherwise the
/// device's own axis extent.
fn absolute_geometry(
    configured: Option<ScreenGeometry>,
    x: AxisRange,
    y: AxisRange,
) -> Result<ScreenGeometry, InputError> {
    if let Some(geometry) = configured {
        return Ok(geometry);
    }
    ScreenGeometry::new(x.extent(), y.extent()).map_err(|_| {
        InputError::Config(format!(
            "device axis range {}..={} x {}..={} is empty and no geometry is configured",
            x.min, x.max, y.min, y.max
        ))
    })
}

enum Active {
    Absolute {
        injector: Injector,
        geometry: ScreenGeometry,
    },
    Relative {
        injector: Injector,
        geometry: ScreenGeometry,
        rotation: Rotation,
        /// Last remote position that was successfully turned into motion.
        last: Option<(i32, i32)>,
    },
}

impl Active {
    fn injector(&self) -> &Injector {
        match self {
            Self::Absolute { injector, .. } | Self::Relative { injector, .. } => injector,
        }
    }

    fn into_injector(self) -> Injector {
        match self {
            Self::Absolute { injector, .. } | Self::Relative { injector, .. } => injector,
        }
    }
}

/// Owner of the single active pointer device.
pub struct PointerBridge {
    options: DeviceOptions,
    active: Option<Active>,
    claim: Option<DeviceClaim>,
}

impl PointerBridge {
    #[must_use]
    pub const fn new(options: DeviceOptions) -> Self {
        Self {
            options,
            active: None,
            claim: None,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Mode of the active device, if any.
    #[must_use]
    pub fn mode(&self) -> Option<PointerMode> {
        match &self.active {
            Some(Active::Absolute { .. }) => Some(PointerMode::Absolute),
            Some(Active::Relative { .. }) => Some(PointerMode::Relative),
            None => None,
        }
    }

    /// Geometry positions are mapped into, if a device is active.
    #[must_use]
    pub fn geometry(&self) -> Option<ScreenGeometry> {
        match &self.active {
            Some(Active::Absolute { geometry, .. } | Active::Relative { geometry, .. }) => {
                Some(*geometry)
            }
            None => None,
        }
    }

    /// Frames rejected by the active device, or 0 when uninitialized.
    #[must_use]
    pub fn failed_frames(&self) -> u64 {
        self.active
            .as_ref()
            .map_or(0, |active| active.injector().failed_frames())
    }

    /// Initialize in the mode named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Config`] when relative mode has no geometry,
    /// otherwise whatever [`init_mouse`](Self::init_mouse) or
    /// [`init_mouse_rel`](Self::init_mouse_rel) return.
    pub fn init_from_config(&mut self, config: &BridgeConfig) -> Result<(), InputError> {
        match config.mode {
            PointerMode::Absolute => self.init_mouse(&config.touch_device, config.rotate),
            PointerMode::Relative => {
                let geometry = config.geometry.ok_or_else(|| {
                    InputError::Config("relative mode requires a framebuffer geometry".to_string())
                })?;
                self.init_mouse_rel(
                    geometry.width(),
                    geometry.height(),
                    &config.touch_device,
                    config.rotate,
                )
            }
        }
    }

    /// Absolute (touch) mode on the device at `touch_device`.
    ///
    /// # Errors
    ///
    /// - [`InputError::AlreadyInitialized`] if this or another bridge
    ///   holds a device.
    /// - [`InputError::DeviceOpen`] / [`InputError::Capability`] from
    ///   opening the touch device.
    /// - [`InputError::Config`] if no geometry is configured and the
    ///   device reports an empty axis range.
    pub fn init_mouse(&mut self, touch_device: &Path, rotation: Rotation) -> Result<(), InputError> {
        self.ensure_uninitialized()?;
        let claim = DeviceClaim::acquire()?;

        let device = TouchDevice::open(touch_device, self.options.write_timeout)?;
        let geometry =
            absolute_geometry(self.options.geometry, device.x_axis(), device.y_axis())?;

        let target = AbsoluteTarget {
            geometry,
            rotation,
            x_axis: device.x_axis(),
            y_axis: device.y_axis(),
            contact: device.contact(),
        };
        self.activate_absolute(Box::new(device), target, claim);
        Ok(())
    }

    /// Relative (mouse) mode with a known framebuffer resolution.
    ///
    /// A virtual uinput pointer is created; `touch_device` is only
    /// recorded in the logs.
    ///
    /// # Errors
    ///
    /// - [`InputError::AlreadyInitialized`] if this or another bridge
    ///   holds a device.
    /// - [`InputError::Config`] for a zero resolution.
    /// - [`InputError::DeviceOpen`] / [`InputError::Capability`] from
    ///   creating the virtual pointer.
    pub fn init_mouse_rel(
        &mut self,
        fb_xres: u32,
        fb_yres: u32,
        touch_device: &Path,
        rotation: Rotation,
    ) -> Result<(), InputError> {
        self.ensure_uninitialized()?;

        let geometry = ScreenGeometry::new(fb_xres, fb_yres)?;
        let claim = DeviceClaim::acquire()?;
        let pointer = VirtualPointer::create(&self.options.device_name)?;
        tracing::debug!(
            touch_device = %touch_device.display(),
            "Touch device not used in relative mode"
        );
        self.activate_relative(Box::new(pointer), geometry, rotation, claim);
        Ok(())
    }

    /// Activate absolute mode on an already-open sink.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::AlreadyInitialized`] if this or another
    /// bridge holds a device.
    pub fn attach_absolute(
        &mut self,
        sink: Box<dyn EventSink>,
        target: AbsoluteTarget,
    ) -> Result<(), InputError> {
        self.ensure_uninitialized()?;
        let claim = DeviceClaim::acquire()?;
        self.activate_absolute(sink, target, claim);
        Ok(())
    }

    /// Activate relative mode on an already-open sink.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::AlreadyInitialized`] if this or another
    /// bridge holds a device.
    pub fn attach_relative(
        &mut self,
        sink: Box<dyn EventSink>,
        geometry: ScreenGeometry,
        rotation: Rotation,
    ) -> Result<(), InputError> {
        self.ensure_uninitialized()?;
        let claim = DeviceClaim::acquire()?;
        self.activate_relative(sink, geometry, rotation, claim);
        Ok(())
    }

    fn activate_absolute(
        &mut self,
        sink: Box<dyn EventSink>,
        target: AbsoluteTarget,
        claim: DeviceClaim,
    ) {
        tracing::info!(
            device = sink.describe(),
            width = target.geometry.width(),
            height = target.geometry.height(),
            rotation = target.rotation.degrees(),
            "Pointer bridge active (absolute)"
        );
        self.active = Some(Active::Absolute {
            injector: Injector::new(sink, InjectionMode::Absolute(target)),
            geometry: target.geometry,
        });
        self.claim = Some(claim);
    }

    fn activate_relative(
        &mut self,
        sink: Box<dyn EventSink>,
        geometry: ScreenGeometry,
        rotation: Rotation,
        claim: DeviceClaim,
    ) {
        tracing::info!(
            device = sink.describe(),
            width = geometry.width(),
            height = geometry.height(),
            rotation = rotation.degrees(),
            "Pointer bridge active (relative)"
        );
        self.active = Some(Active::Relative {
            injector: Injector::new(sink, InjectionMode::Relative),
            geometry,
            rotation,
            last: None,
        });
        self.claim = Some(claim);
    }

    /// Inject one remote pointer update.
    ///
    /// `screen` is the remote framebuffer the position is expressed in;
    /// positions are rescaled when it differs from the active geometry.
    /// In relative mode the position is turned into a rotated delta from
    /// the previous update; the first update after init only sets the
    /// reference point.
    ///
    /// # Errors
    ///
    /// - [`InputError::NotInitialized`] before init or after cleanup.
    /// - [`InputError::Injection`] if the device rejects the frame. The
    ///   bridge stays usable and later calls try again.
    pub fn inject_mouse_event(
        &mut self,
        screen: ScreenGeometry,
        mask: ButtonMask,
        x: i32,
        y: i32,
    ) -> Result<(), InputError> {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!(x, y, "Pointer event without an active device, dropping");
            return Err(InputError::NotInitialized);
        };

        match active {
            Active::Absolute { injector, geometry } => {
                let (px, py) = geometry.rescale_from(screen, x, y);
                injector.inject(mask, px, py)
            }
            Active::Relative {
                injector,
                geometry,
                rotation,
                last,
            } => {
                let (sx, sy) = geometry.rescale_from(screen, x, y);
                let (px, py) = geometry.clamp(i64::from(sx), i64::from(sy));
                let (dx, dy) = match *last {
                    Some((lx, ly)) => rotation.rotate_delta(px - lx, py - ly),
                    None => (0, 0),
                };
                injector.inject(mask, dx, dy)?;
                *last = Some((px, py));
                Ok(())
            }
        }
    }

    /// Close the active device, if any. Safe to call repeatedly and after
    /// a failed init.
    pub fn cleanup_mouse(&mut self) {
        match self.active.take() {
            Some(active) => active.into_injector().close(),
            None => tracing::debug!("cleanup_mouse with no active device"),
        }
        if self.claim.take().is_some() {
            tracing::debug!("Released pointer device claim");
        }
    }

    fn ensure_uninitialized(&self) -> Result<(), InputError> {
        if self.active.is_some() {
            return Err(InputError::AlreadyInitialized);
        }
        Ok(())
    }
}

impl Default for PointerBridge {
    fn default() -> Self {
        Self::new(DeviceOptions::default())
    }
}

impl Drop for PointerBridge {
    fn drop(&mut self) {
        self.cleanup_mouse();
    }
}

/// A [`PointerBridge`] behind one mutex, for callers that inject from
/// more than one thread. Each call holds the lock for one whole frame.
#[derive(Clone)]
pub struct SharedPointerBridge {
    inner: Arc<Mutex<PointerBridge>>,
}

impl SharedPointerBridge {
    #[must_use]
    pub fn new(bridge: PointerBridge) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bridge)),
        }
    }

    /// Lock the bridge for init, cleanup or inspection.
    pub fn lock(&self) -> MutexGuard<'_, PointerBridge> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`PointerBridge::inject_mouse_event`].
    ///
    /// # Errors
    ///
    /// Same as [`PointerBridge::inject_mouse_event`].
    pub fn inject_mouse_event(
        &self,
        screen: ScreenGeometry,
        mask: ButtonMask,
        x: i32,
        y: i32,
    ) -> Result<(), InputError> {
        self.lock().inject_mouse_event(screen, mask, x, y)
    }
}
