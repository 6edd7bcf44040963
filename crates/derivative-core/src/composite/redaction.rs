//! Opaque black redaction boxes.
//!
//! Redaction rectangles are given in full-resolution source pixels. By the
//! time they are painted the buffer has usually been cropped and may have
//! been decoded at a reduced size, so each rectangle is divided by `2^rf`,
//! rounded, and moved by the origin the crop used in the buffer.

use std::borrow::Cow;

use image::Pixel;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::TransformError;
use crate::raster::Raster;
use crate::sample::{color_channels, has_alpha, Buffer, Sample};
use crate::transform::{Crop, PixelRect, ReductionFactor};

/// A rectangle of the full-resolution source to black out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Redaction {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Redaction {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle in the cropped buffer, clipped to `bounds`.
    ///
    /// `crop_origin` is the crop's rounded top-left corner in the uncropped
    /// buffer, so both sides of the subtraction are whole buffer pixels.
    fn buffer_rect(
        &self,
        crop_origin: (u32, u32),
        bounds: (u32, u32),
        rf: ReductionFactor,
    ) -> Option<PixelRect> {
        let d = rf.divisor();
        PixelRect::clipped(
            (self.x as f64 / d).round() - crop_origin.0 as f64,
            (self.y as f64 / d).round() - crop_origin.1 as f64,
            self.width as f64 / d,
            self.height as f64 / d,
            bounds,
        )
    }
}

/// Paint redaction rectangles opaque black.
///
/// `crop` is the crop already applied to the raster and `source_bounds` the
/// size of the buffer it was applied to. The crop origin is resolved
/// against those bounds exactly as [`crop_image`](crate::crop_image) does.
/// Rectangles that end up empty or outside the buffer are skipped.
///
/// # Returns
///
/// `Cow::Borrowed` when nothing is painted, otherwise a copy with every
/// surviving rectangle filled (black, fully opaque when the raster has
/// alpha).
///
/// # Errors
///
/// [`TransformError::InvalidOperationParameter`] when `crop` itself is
/// invalid.
pub fn apply_redactions<'a>(
    raster: &'a Raster,
    crop: &Crop,
    source_bounds: (u32, u32),
    rf: ReductionFactor,
    redactions: &[Redaction],
) -> Result<Cow<'a, Raster>, TransformError> {
    if redactions.is_empty() {
        return Ok(Cow::Borrowed(raster));
    }
    crop.validate()?;

    let Some(region) = crop.buffer_region(source_bounds, rf) else {
        trace!(?crop, "Crop leaves nothing to redact");
        return Ok(Cow::Borrowed(raster));
    };
    let origin = (region.x, region.y);
    let bounds = raster.dimensions();
    let rects: Vec<PixelRect> = redactions
        .iter()
        .filter_map(|r| {
            let rect = r.buffer_rect(origin, bounds, rf);
            if rect.is_none() {
                trace!(redaction = ?r, "Redaction falls outside the image");
            }
            rect
        })
        .collect();

    if rects.is_empty() {
        return Ok(Cow::Borrowed(raster));
    }

    debug!(
        count = rects.len(),
        skipped = redactions.len() - rects.len(),
        rf = rf.factor(),
        "Applying redactions"
    );

    let mut out = raster.clone();
    for rect in &rects {
        match &mut out {
            Raster::Gray8(buf) => fill_black(buf, rect),
            Raster::Gray16(buf) => fill_black(buf, rect),
            Raster::GrayAlpha8(buf) => fill_black(buf, rect),
            Raster::GrayAlpha16(buf) => fill_black(buf, rect),
            Raster::Rgb8(buf) => fill_black(buf, rect),
            Raster::Rgb16(buf) => fill_black(buf, rect),
            Raster::RgbAlpha8(buf) => fill_black(buf, rect),
            Raster::RgbAlpha16(buf) => fill_black(buf, rect),
            Raster::Bitonal(bits) => {
                for y in rect.y..rect.y + rect.height {
                    for x in rect.x..rect.x + rect.width {
                        bits.set(x, y, false);
                    }
                }
            }
        }
    }
    Ok(Cow::Owned(out))
}

fn fill_black<P>(buf: &mut Buffer<P>, rect: &PixelRect)
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let colors = color_channels::<P>();
    let opaque = <P::Subpixel as Sample>::from_f32(<P::Subpixel as Sample>::MAX);
    let black = <P::Subpixel as Sample>::from_f32(0.0);

    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            let c = buf.get_pixel_mut(x, y).channels_mut();
            c[..colors].fill(black);
            if has_alpha::<P>() {
                c[colors] = opaque;
            }
        }
    }
}
