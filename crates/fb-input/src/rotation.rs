//! Panel rotation and screen geometry.
//!
//! Rotation is applied in the physical panel's coordinate space. The
//! convention used here: a 90 degree setting maps `(x, y)` to
//! `(height - y, x)`, and 270 degrees is its exact inverse,
//! `(y, height - x)`. Both absolute positions and relative deltas share
//! the [`Rotation`] enum but go through separate transforms
//! ([`Rotation::map_position`] and [`Rotation::rotate_delta`]).

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Physical framebuffer resolution in pixels. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry", into = "RawGeometry")]
pub struct ScreenGeometry {
    width: u32,
    height: u32,
}

#[derive(Serialize, Deserialize)]
struct RawGeometry {
    width: u32,
    height: u32,
}

impl TryFrom<RawGeometry> for ScreenGeometry {
    type Error = InputError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height)
    }
}

impl From<ScreenGeometry> for RawGeometry {
    fn from(geometry: ScreenGeometry) -> Self {
        Self {
            width: geometry.width,
            height: geometry.height,
        }
    }
}

impl ScreenGeometry {
    /// Create a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Config`] if either side is zero or does not
    /// fit in an `i32` coordinate.
    pub fn new(width: u32, height: u32) -> Result<Self, InputError> {
        if width == 0 || height == 0 {
            return Err(InputError::Config(format!(
                "screen geometry must be non-zero, got {width}x{height}"
            )));
        }
        if i32::try_from(width).is_err() || i32::try_from(height).is_err() {
            return Err(InputError::Config(format!(
                "screen geometry {width}x{height} is out of range"
            )));
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub const fn width(self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(self) -> u32 {
        self.height
    }

    /// Clamp a coordinate into `[0, width - 1] x [0, height - 1]`.
    #[must_use]
    pub fn clamp(self, x: i64, y: i64) -> (i32, i32) {
        (clamp_to(x, self.width), clamp_to(y, self.height))
    }

    /// Rescale a position expressed in `source` space into this geometry.
    ///
    /// Identity when both geometries are equal.
    #[must_use]
    pub fn rescale_from(self, source: Self, x: i32, y: i32) -> (i32, i32) {
        if source == self {
            return (x, y);
        }
        let sx = i64::from(x) * i64::from(self.width) / i64::from(source.width);
        let sy = i64::from(y) * i64::from(self.height) / i64::from(source.height);
        self.clamp(sx, sy)
    }
}

// extent fits in i32 (checked in `ScreenGeometry::new`)
#[allow(clippy::cast_possible_truncation)]
fn clamp_to(value: i64, extent: u32) -> i32 {
    value.clamp(0, i64::from(extent) - 1) as i32
}

/// Angular offset between the remote coordinate space and the panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Parse a rotation given in degrees.
    ///
    /// Values are normalized modulo 360, so `-90` is the same as `270`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Config`] for anything that is not a multiple
    /// of 90.
    pub fn from_degrees(degrees: i32) -> Result<Self, InputError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Normal),
            90 => Ok(Self::Rotate90),
            180 => Ok(Self::Rotate180),
            270 => Ok(Self::Rotate270),
            _ => Err(InputError::Config(format!(
                "rotation must be 0, 90, 180 or 270 degrees, got {degrees}"
            ))),
        }
    }

    #[must_use]
    pub const fn degrees(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }

    /// Map a remote position onto the panel, clamped to `geometry`.
    #[must_use]
    pub fn map_position(self, geometry: ScreenGeometry, x: i32, y: i32) -> (i32, i32) {
        let (x, y) = (i64::from(x), i64::from(y));
        let w = i64::from(geometry.width);
        let h = i64::from(geometry.height);
        let (mx, my) = match self {
            Self::Normal => (x, y),
            Self::Rotate90 => (h - y, x),
            Self::Rotate180 => (w - x, h - y),
            Self::Rotate270 => (y, h - x),
        };
        geometry.clamp(mx, my)
    }

    /// Rotate a motion vector. Uses the linear part of
    /// [`map_position`](Self::map_position), without translation or clamping.
    #[must_use]
    pub const fn rotate_delta(self, dx: i32, dy: i32) -> (i32, i32) {
        match self {
            Self::Normal => (dx, dy),
            Self::Rotate90 => (dy.saturating_neg(), dx),
            Self::Rotate180 => (dx.saturating_neg(), dy.saturating_neg()),
            Self::Rotate270 => (dy, dx.saturating_neg()),
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = InputError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}
