//! Arbitrary-angle rotation with bilinear interpolation.
//!
//! # Algorithm
//!
//! The rotation uses inverse mapping: for each pixel in the output image,
//! we calculate which source position it came from and interpolate the
//! four surrounding source pixels.
//!
//! Angles are clockwise on screen (y pointing down). For rotation by angle θ
//! the inverse transform is:
//! ```text
//! src_x =  (dst_x - dst_cx) * cos(θ) + (dst_y - dst_cy) * sin(θ) + src_cx
//! src_y = -(dst_x - dst_cx) * sin(θ) + (dst_y - dst_cy) * cos(θ) + src_cy
//! ```
//!
//! The canvas grows to the rotated bounding box; uncovered pixels take the
//! zero sample (black, or transparent when the raster has alpha).

use std::borrow::Cow;

use image::Pixel;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::ensure_not_empty;
use crate::error::TransformError;
use crate::raster::{map_buffer, BitonalImage, Raster};
use crate::sample::{Buffer, Sample};

/// Clockwise rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotate {
    pub degrees: f64,
}

impl Rotate {
    pub fn new(degrees: f64) -> Self {
        Self { degrees }
    }

    /// Whether the angle is a whole number of turns.
    pub fn is_noop(&self) -> bool {
        is_multiple_of(self.degrees, 360.0)
    }
}

fn is_multiple_of(degrees: f64, step: f64) -> bool {
    let rem = degrees.rem_euclid(step);
    rem < 0.001 || step - rem < 0.001
}

/// Compute the dimensions of the bounding box for a rotated image.
///
/// When an image is rotated, the corners extend beyond the original bounds.
/// This function calculates the minimum bounding box that contains the
/// entire rotated image.
///
/// # Arguments
///
/// * `width` - Original image width
/// * `height` - Original image height
/// * `angle_degrees` - Rotation angle in degrees (direction does not matter)
///
/// # Returns
///
/// Tuple of (new_width, new_height) for the rotated bounding box.
///
/// # Example
///
/// ```text
/// compute_rotated_bounds(100, 50, 90.0) -> (50, 100)
/// compute_rotated_bounds(20, 20, 15.0)  -> (24, 24)
/// ```
pub fn compute_rotated_bounds(width: u32, height: u32, angle_degrees: f64) -> (u32, u32) {
    // Exact swaps for quarter turns
    if is_multiple_of(angle_degrees, 180.0) {
        return (width, height);
    }
    if is_multiple_of(angle_degrees - 90.0, 180.0) {
        return (height, width);
    }

    let angle_rad = angle_degrees.to_radians();
    let cos = angle_rad.cos().abs();
    let sin = angle_rad.sin().abs();

    let w = width as f64;
    let h = height as f64;

    // new_w = |w*cos| + |h*sin|
    // new_h = |h*cos| + |w*sin|
    let new_w = (w * cos + h * sin).round() as u32;
    let new_h = (h * cos + w * sin).round() as u32;

    (new_w.max(1), new_h.max(1))
}

/// Rotate a raster clockwise about its center.
///
/// The output keeps the raster's variant and grows to the rotated bounding
/// box. Bitonal rasters are rotated as 8-bit gray and re-thresholded.
///
/// # Returns
///
/// `Cow::Borrowed` for whole turns, `Cow::Owned` otherwise.
///
/// # Errors
///
/// [`TransformError::InvalidOperationParameter`] for a non-finite angle or a
/// raster with no pixels.
pub fn rotate_image<'a>(
    raster: &'a Raster,
    rotate: &Rotate,
) -> Result<Cow<'a, Raster>, TransformError> {
    if !rotate.degrees.is_finite() {
        return Err(TransformError::invalid(format!(
            "rotation angle must be finite, got {}",
            rotate.degrees
        )));
    }
    if rotate.is_noop() {
        trace!(degrees = rotate.degrees, "Rotation is a whole turn");
        return Ok(Cow::Borrowed(raster));
    }
    ensure_not_empty(raster.dimensions(), "rotate")?;

    let (width, height) = raster.dimensions();
    let (dst_w, dst_h) = compute_rotated_bounds(width, height, rotate.degrees);
    debug!(
        degrees = rotate.degrees,
        src_width = width,
        src_height = height,
        width = dst_w,
        height = dst_h,
        "Rotating raster"
    );

    Ok(Cow::Owned(map_buffer!(
        raster,
        |buf| rotate_buffer(buf, rotate.degrees, dst_w, dst_h),
        |bits| {
            let gray = rotate_buffer(&bits.to_gray8(), rotate.degrees, dst_w, dst_h);
            Raster::Bitonal(BitonalImage::from_gray8(&gray))
        }
    )))
}

fn rotate_buffer<P>(src: &Buffer<P>, degrees: f64, dst_w: u32, dst_h: u32) -> Buffer<P>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let channels = P::CHANNEL_COUNT as usize;
    let angle_rad = degrees.to_radians();
    let cos = angle_rad.cos();
    let sin = angle_rad.sin();

    // Center of source and destination images
    let src_cx = src.width() as f64 / 2.0;
    let src_cy = src.height() as f64 / 2.0;
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    let mut out = Buffer::<P>::new(dst_w, dst_h);
    let mut pixel = vec![0f32; channels];

    for (dst_x, dst_y, px) in out.enumerate_pixels_mut() {
        // Measure from pixel centers
        let dx = dst_x as f64 + 0.5 - dst_cx;
        let dy = dst_y as f64 + 0.5 - dst_cy;

        let src_x = dx * cos + dy * sin + src_cx - 0.5;
        let src_y = -dx * sin + dy * cos + src_cy - 0.5;

        if sample_bilinear(src, src_x, src_y, &mut pixel) {
            for (dst, value) in px.channels_mut().iter_mut().zip(&pixel) {
                *dst = <P::Subpixel as Sample>::from_f32(*value);
            }
        }
    }

    out
}

/// Sample a pixel using bilinear interpolation.
///
/// Bilinear interpolation considers the 4 nearest pixels and weights
/// their contribution based on distance. Returns `false` (leaving `out`
/// untouched) when the position falls outside the source.
fn sample_bilinear<P>(image: &Buffer<P>, x: f64, y: f64, out: &mut [f32]) -> bool
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let (w, h) = (image.width() as f64, image.height() as f64);

    // Half a pixel of slack keeps edge pixels whole
    if x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
        return false;
    }

    let x = x.clamp(0.0, w - 1.0);
    let y = y.clamp(0.0, h - 1.0);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);

    // Fractional distances
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let p00 = image.get_pixel(x0, y0).channels();
    let p10 = image.get_pixel(x1, y0).channels();
    let p01 = image.get_pixel(x0, y1).channels();
    let p11 = image.get_pixel(x1, y1).channels();

    for (i, value) in out.iter_mut().enumerate() {
        *value = p00[i].as_f32() * (1.0 - fx) * (1.0 - fy)
            + p10[i].as_f32() * fx * (1.0 - fy)
            + p01[i].as_f32() * (1.0 - fx) * fy
            + p11[i].as_f32() * fx * fy;
    }
    true
}
