//! Region extraction.
//!
//! Crop regions describe the full-resolution source. They are mapped onto
//! the (possibly reduced) buffer, rounded to whole pixels and clipped to its
//! bounds before anything is copied.
//!
//! # Example
//!
//! ```text
//! 1000x800 source decoded at rf 2 -> 250x200 buffer
//! Crop::pixels(200, 100, 400, 400) -> (50, 25) 100x100 in the buffer
//! ```

use std::borrow::Cow;

use image::imageops;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::ReductionFactor;
use crate::error::TransformError;
use crate::raster::{map_buffer, BitonalImage, Raster};

/// Shape of a crop region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropShape {
    #[default]
    Rectangle,
    /// The largest centered square; explicit coordinates are ignored.
    Square,
}

/// Unit of a crop region's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropUnit {
    /// Full-resolution pixels.
    #[default]
    Pixels,
    /// Fractions (0.0 to 1.0) of the image dimensions.
    Percent,
}

/// Which part of the source to keep.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crop {
    /// Keep everything.
    #[default]
    Full,
    Region {
        #[serde(default)]
        shape: CropShape,
        #[serde(default)]
        unit: CropUnit,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
    },
}

impl Crop {
    /// A rectangle in full-resolution pixels.
    pub fn pixels(x: u32, y: u32, width: u32, height: u32) -> Self {
        Crop::Region {
            shape: CropShape::Rectangle,
            unit: CropUnit::Pixels,
            x: x as f64,
            y: y as f64,
            width: width as f64,
            height: height as f64,
        }
    }

    /// A rectangle in fractions of the image dimensions.
    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Crop::Region {
            shape: CropShape::Rectangle,
            unit: CropUnit::Percent,
            x,
            y,
            width,
            height,
        }
    }

    /// The largest centered square.
    pub fn square() -> Self {
        Crop::Region {
            shape: CropShape::Square,
            unit: CropUnit::Pixels,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Crop::Full)
    }

    pub(crate) fn validate(&self) -> Result<(), TransformError> {
        let Crop::Region {
            shape: CropShape::Rectangle,
            x,
            y,
            width,
            height,
            ..
        } = *self
        else {
            return Ok(());
        };

        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return Err(TransformError::invalid(format!(
                "crop origin must be finite and non-negative, got ({x}, {y})"
            )));
        }
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(TransformError::invalid(format!(
                "crop size must be finite and positive, got {width}x{height}"
            )));
        }
        Ok(())
    }

    /// The region mapped onto a buffer of `bounds` decoded at `rf`, rounded
    /// and clipped. `None` when it does not overlap the buffer.
    pub(crate) fn buffer_region(&self, bounds: (u32, u32), rf: ReductionFactor) -> Option<PixelRect> {
        let (w, h) = bounds;
        let d = rf.divisor();
        let (x, y, width, height) = match *self {
            Crop::Full => return PixelRect::full(bounds),
            Crop::Region {
                shape: CropShape::Square,
                ..
            } => {
                let (x, y) = square_origin(bounds);
                let side = w.min(h);
                return PixelRect::full((side, side)).map(|r| r.offset(x, y));
            }
            Crop::Region {
                unit: CropUnit::Pixels,
                x,
                y,
                width,
                height,
                ..
            } => (x / d, y / d, width / d, height / d),
            Crop::Region {
                unit: CropUnit::Percent,
                x,
                y,
                width,
                height,
                ..
            } => {
                let (w, h) = (w as f64, h as f64);
                (x * w / d, y * h / d, width * w / d, height * h / d)
            }
        };

        // A requested region never collapses below one pixel.
        PixelRect::clipped(x, y, width.round().max(1.0), height.round().max(1.0), bounds)
    }
}

fn square_origin((w, h): (u32, u32)) -> (u32, u32) {
    let side = w.min(h);
    ((w - side) / 2, (h - side) / 2)
}

/// An integer rectangle inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    fn full((width, height): (u32, u32)) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self {
            x: 0,
            y: 0,
            width,
            height,
        })
    }

    fn offset(self, dx: u32, dy: u32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    /// Round a rectangle given in buffer pixels and clip it to `bounds`.
    ///
    /// The origin and the extent are rounded separately so that the size of
    /// an unclipped rectangle is exactly `round(width) x round(height)`.
    pub(crate) fn clipped(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        bounds: (u32, u32),
    ) -> Option<Self> {
        let left = x.round();
        let top = y.round();
        let right = left + width.round();
        let bottom = top + height.round();

        let x0 = left.max(0.0);
        let y0 = top.max(0.0);
        let x1 = right.min(bounds.0 as f64);
        let y1 = bottom.min(bounds.1 as f64);
        if !(x1 > x0 && y1 > y0) {
            return None;
        }

        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    pub(crate) fn covers(&self, (width, height): (u32, u32)) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }
}

/// Crop a raster to a region of the full-resolution source.
///
/// The buffer is assumed to have been decoded at reduction factor `rf`, so
/// pixel coordinates are divided by `2^rf`. Square crops take the centered
/// square of the buffer itself.
///
/// # Returns
///
/// - `Cow::Borrowed` for [`Crop::Full`] or a region covering the whole buffer
/// - `Cow::Owned` with exactly the clipped sub-region otherwise
///
/// # Errors
///
/// [`TransformError::InvalidOperationParameter`] for a negative or non-finite
/// origin, a non-positive size, or a region lying entirely outside the
/// buffer.
pub fn crop_image<'a>(
    raster: &'a Raster,
    crop: &Crop,
    rf: ReductionFactor,
) -> Result<Cow<'a, Raster>, TransformError> {
    if crop.is_full() {
        return Ok(Cow::Borrowed(raster));
    }
    crop.validate()?;

    let bounds = raster.dimensions();
    let rect = crop.buffer_region(bounds, rf).ok_or_else(|| {
        TransformError::invalid(format!(
            "crop region {crop:?} at rf {} lies outside the {}x{} image",
            rf.factor(),
            bounds.0,
            bounds.1
        ))
    })?;

    if rect.covers(bounds) {
        trace!(?crop, "Crop covers the whole image");
        return Ok(Cow::Borrowed(raster));
    }

    debug!(
        x = rect.x,
        y = rect.y,
        width = rect.width,
        height = rect.height,
        src_width = bounds.0,
        src_height = bounds.1,
        rf = rf.factor(),
        "Cropped raster"
    );
    Ok(Cow::Owned(extract(raster, rect)))
}

/// Copy a rectangle that lies inside the raster.
fn extract(raster: &Raster, rect: PixelRect) -> Raster {
    let PixelRect {
        x,
        y,
        width,
        height,
    } = rect;
    map_buffer!(
        raster,
        |buf| imageops::crop_imm(buf, x, y, width, height).to_image(),
        |bits| Raster::Bitonal(BitonalImage::from_fn(width, height, |i, j| {
            bits.get(x + i, y + j)
        }))
    )
}


// ============================================================================
// Property-Based Tests
// ============================================================================
