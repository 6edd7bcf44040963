//! Enhancement filters: unsharp-mask sharpening and contrast stretching.
//!
//! Both filters touch color components only. Alpha is copied through
//! untouched, and bitonal rasters either pass through unchanged or are
//! filtered as 8-bit gray and re-thresholded.

use std::borrow::Cow;

use image::Pixel;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::TransformError;
use crate::raster::{map_buffer, BitonalImage, Raster};
use crate::sample::{color_channels, Buffer, Sample};

/// 1D binomial weights; the 2D blur kernel is their outer product over 16.
const BLUR_WEIGHTS: [f32; 3] = [1.0, 2.0, 1.0];
const BLUR_NORM: f32 = 16.0;

/// Unsharp-mask strength.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sharpen {
    /// Multiple of the high-pass detail added back (0 = no change).
    pub amount: f64,
}

impl Sharpen {
    pub fn new(amount: f64) -> Self {
        Self { amount }
    }

    pub fn is_noop(&self) -> bool {
        self.amount == 0.0
    }

    fn validate(&self) -> Result<(), TransformError> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(TransformError::invalid(format!(
                "sharpen amount must be a finite non-negative number, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Sharpen a raster with an unsharp mask.
///
/// Each color component becomes `v + amount * (v - blur(v))`, where `blur` is
/// a 3x3 binomial kernel with clamped edges, clamped to the sample range.
///
/// # Errors
///
/// [`TransformError::InvalidOperationParameter`] for a negative or non-finite
/// amount.
pub fn sharpen_image<'a>(
    raster: &'a Raster,
    sharpen: &Sharpen,
) -> Result<Cow<'a, Raster>, TransformError> {
    sharpen.validate()?;
    if sharpen.is_noop() {
        trace!("Sharpen amount is zero");
        return Ok(Cow::Borrowed(raster));
    }

    let amount = sharpen.amount as f32;
    let (width, height) = raster.dimensions();
    debug!(amount, width, height, "Sharpening raster");

    Ok(Cow::Owned(map_buffer!(
        raster,
        |buf| unsharp_mask(buf, amount),
        |bits| {
            let gray = unsharp_mask(&bits.to_gray8(), amount);
            Raster::Bitonal(BitonalImage::from_gray8(&gray))
        }
    )))
}

fn unsharp_mask<P>(src: &Buffer<P>, amount: f32) -> Buffer<P>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let (width, height) = src.dimensions();
    let (w, h) = (width as usize, height as usize);
    let stride = P::CHANNEL_COUNT as usize;
    let colors = color_channels::<P>();

    let raw: &[P::Subpixel] = src.as_raw();
    let mut out = src.clone();
    let dst: &mut [P::Subpixel] = &mut out;

    for y in 0..h {
        for x in 0..w {
            let at = (y * w + x) * stride;
            for c in 0..colors {
                let mut blur = 0.0;
                for (dy, wy) in [-1isize, 0, 1].into_iter().zip(BLUR_WEIGHTS) {
                    let sy = y.saturating_add_signed(dy).min(h - 1);
                    for (dx, wx) in [-1isize, 0, 1].into_iter().zip(BLUR_WEIGHTS) {
                        let sx = x.saturating_add_signed(dx).min(w - 1);
                        blur += wx * wy * raw[(sy * w + sx) * stride + c].as_f32();
                    }
                }
                let value = raw[at + c].as_f32();
                let sharpened = value + amount * (value - blur / BLUR_NORM);
                dst[at + c] = <P::Subpixel as Sample>::from_f32(sharpened);
            }
        }
    }
    out
}

/// Stretch color samples to span the full range of the bit depth.
///
/// The minimum and maximum over every color sample in the raster map to 0 and
/// the depth's maximum, with one linear mapping shared by all components so
/// hues are kept.
///
/// # Returns
///
/// `Cow::Borrowed` for bitonal rasters, single-valued rasters and rasters
/// that already span the full range.
pub fn stretch_contrast(raster: &Raster) -> Cow<'_, Raster> {
    let stretched = match raster {
        Raster::Gray8(buf) => stretch_buffer(buf).map(Raster::Gray8),
        Raster::Gray16(buf) => stretch_buffer(buf).map(Raster::Gray16),
        Raster::GrayAlpha8(buf) => stretch_buffer(buf).map(Raster::GrayAlpha8),
        Raster::GrayAlpha16(buf) => stretch_buffer(buf).map(Raster::GrayAlpha16),
        Raster::Rgb8(buf) => stretch_buffer(buf).map(Raster::Rgb8),
        Raster::Rgb16(buf) => stretch_buffer(buf).map(Raster::Rgb16),
        Raster::RgbAlpha8(buf) => stretch_buffer(buf).map(Raster::RgbAlpha8),
        Raster::RgbAlpha16(buf) => stretch_buffer(buf).map(Raster::RgbAlpha16),
        Raster::Bitonal(_) => None,
    };

    match stretched {
        Some(out) => Cow::Owned(out),
        None => {
            trace!("Contrast already stretched");
            Cow::Borrowed(raster)
        }
    }
}

/// Smallest and largest color sample.
fn color_range<P>(buf: &Buffer<P>) -> (f32, f32)
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let colors = color_channels::<P>();
    buf.pixels()
        .flat_map(|p| p.channels()[..colors].iter())
        .fold((f32::MAX, f32::MIN), |(lo, hi), &c| {
            let v = c.as_f32();
            (lo.min(v), hi.max(v))
        })
}

fn stretch_buffer<P>(buf: &Buffer<P>) -> Option<Buffer<P>>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let max = <P::Subpixel as Sample>::MAX;
    let (lo, hi) = color_range(buf);
    if hi <= lo || (lo == 0.0 && hi == max) {
        return None;
    }

    debug!(
        min = lo,
        max = hi,
        width = buf.width(),
        height = buf.height(),
        "Stretching contrast"
    );

    let colors = color_channels::<P>();
    let gain = max / (hi - lo);
    let mut out = buf.clone();
    for px in out.pixels_mut() {
        for c in &mut px.channels_mut()[..colors] {
            *c = <P::Subpixel as Sample>::from_f32((c.as_f32() - lo) * gain);
        }
    }
    Some(out)
}
