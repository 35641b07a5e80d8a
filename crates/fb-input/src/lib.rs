//! Pointer injection bridge for framebuffer VNC servers.
//!
//! Translates remote pointer updates (position + button mask) into Linux
//! input events, either as absolute touches on an existing touchscreen
//! node or as relative motion on a synthetic uinput mouse.
//!
//! - [`rotation`]: panel rotation and screen geometry math
//! - [`device`]: touch device and virtual pointer handles
//! - [`injector`]: per-update event frame construction
//! - [`bridge`]: mode selection and device lifecycle
//! - [`config`]: TOML configuration

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod injector;
pub mod rotation;

pub use bridge::{DeviceOptions, PointerBridge, SharedPointerBridge};
pub use config::{BridgeConfig, PointerMode};
pub use device::{AxisRange, EventSink, TouchDevice, VirtualPointer};
pub use error::InputError;
pub use injector::{AbsoluteTarget, ButtonMask, InjectionMode, Injector};
pub use rotation::{Rotation, ScreenGeometry};
