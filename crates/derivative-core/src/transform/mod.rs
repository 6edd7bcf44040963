//! Geometric transforms: crop, scale, rotate and transpose.
//!
//! # Transform Order
//!
//! A derivative is produced by applying, in this order:
//! 1. Crop
//! 2. Scale
//! 3. Rotate
//! 4. Transpose
//!
//! # Coordinate System
//!
//! - Origin is the top-left corner
//! - Crop and percent-scale parameters are relative to the conceptual
//!   full-resolution source and are divided by `2^rf` when the decoder has
//!   already reduced the buffer by a [`ReductionFactor`] of `rf`
//! - Absolute scale targets (fit width/height/inside, fill) are final output
//!   sizes and are never adjusted by the reduction factor
//! - Rotation angles are in degrees, positive = clockwise

mod crop;
mod resample;
mod rotation;
mod scale;
mod transpose;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

pub use crop::{crop_image, Crop, CropShape, CropUnit};
pub(crate) use crop::PixelRect;
pub use rotation::{compute_rotated_bounds, rotate_image, Rotate};
pub use scale::{scale_image, Scale, ScaleMode};
pub use transpose::{transpose_image, Transpose};

/// How many times (as a power of two) a decoder has already halved the
/// source before handing the raster to the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReductionFactor(pub u32);

impl ReductionFactor {
    /// The raster is at full resolution.
    pub const NONE: ReductionFactor = ReductionFactor(0);

    pub fn new(factor: u32) -> Self {
        Self(factor)
    }

    pub fn factor(self) -> u32 {
        self.0
    }

    /// `2^rf`: how many full-resolution pixels span one buffer pixel.
    pub fn divisor(self) -> f64 {
        2f64.powi(self.0 as i32)
    }

    /// `1 / 2^rf`: the buffer's size relative to full resolution.
    pub fn scale(self) -> f64 {
        1.0 / self.divisor()
    }

    /// The largest factor whose scale still covers `scale`, capped at
    /// `max_factor`.
    ///
    /// A decoder uses this to pick the smallest pyramid level that can still
    /// be scaled down (never up) to the requested size.
    ///
    /// ```text
    /// for_scale(0.5, 5)  -> 1
    /// for_scale(0.3, 5)  -> 1
    /// for_scale(0.25, 5) -> 2
    /// for_scale(0.01, 3) -> 3
    /// ```
    pub fn for_scale(scale: f64, max_factor: u32) -> Self {
        let mut factor = 0;
        if !scale.is_finite() || scale <= 0.0 {
            return Self(factor);
        }
        let mut next = 0.5;
        while factor < max_factor && scale <= next + f64::EPSILON {
            next /= 2.0;
            factor += 1;
        }
        Self(factor)
    }
}

/// Resampling transforms need at least one source pixel on each axis.
pub(crate) fn ensure_not_empty(
    (width, height): (u32, u32),
    operation: &str,
) -> Result<(), TransformError> {
    if width == 0 || height == 0 {
        return Err(TransformError::invalid(format!(
            "cannot {operation} an empty {width}x{height} raster"
        )));
    }
    Ok(())
}

impl From<u32> for ReductionFactor {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
