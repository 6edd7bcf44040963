//! Scaling to absolute or relative output sizes.
//!
//! Absolute modes name the final output size and ignore the reduction
//! factor. Percent scales are relative to the full-resolution source, so a
//! buffer already reduced by `2^rf` is scaled by `percent * 2^rf`.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::resample::resample;
use super::{ensure_not_empty, ReductionFactor};
use crate::error::TransformError;
use crate::raster::{map_buffer, BitonalImage, Raster};

/// How absolute target dimensions are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Match the target width, keeping aspect ratio.
    FitWidth,
    /// Match the target height, keeping aspect ratio.
    FitHeight,
    /// Largest size inside the target box, keeping aspect ratio.
    FitInside,
    /// Exactly the target size, ignoring aspect ratio.
    Fill,
}

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Keep the current size.
    #[default]
    Full,
    Absolute {
        mode: ScaleMode,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
    /// Fraction of the full-resolution size (1.0 = 100%).
    Percent(f64),
}

impl Scale {
    pub fn fit_width(width: u32) -> Self {
        Scale::Absolute {
            mode: ScaleMode::FitWidth,
            width: Some(width),
            height: None,
        }
    }

    pub fn fit_height(height: u32) -> Self {
        Scale::Absolute {
            mode: ScaleMode::FitHeight,
            width: None,
            height: Some(height),
        }
    }

    pub fn fit_inside(width: u32, height: u32) -> Self {
        Scale::Absolute {
            mode: ScaleMode::FitInside,
            width: Some(width),
            height: Some(height),
        }
    }

    pub fn fill(width: u32, height: u32) -> Self {
        Scale::Absolute {
            mode: ScaleMode::Fill,
            width: Some(width),
            height: Some(height),
        }
    }

    pub fn percent(percent: f64) -> Self {
        Scale::Percent(percent)
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Scale::Full)
    }

    /// Output size for a buffer of `(width, height)` decoded at `rf`.
    ///
    /// The result equals the input size when no scaling is needed.
    ///
    /// # Errors
    ///
    /// [`TransformError::InvalidOperationParameter`] when a target the mode
    /// needs is missing or zero, a percentage is not finite and positive, or
    /// the buffer has no pixels.
    pub fn target_size(
        &self,
        (width, height): (u32, u32),
        rf: ReductionFactor,
    ) -> Result<(u32, u32), TransformError> {
        if self.is_full() {
            return Ok((width, height));
        }
        ensure_not_empty((width, height), "scale")?;

        let (w, h) = (width as f64, height as f64);
        match *self {
            Scale::Full => Ok((width, height)),
            Scale::Absolute {
                mode,
                width: target_w,
                height: target_h,
            } => {
                let tw = require_target(mode, "width", target_w);
                let th = require_target(mode, "height", target_h);
                match mode {
                    ScaleMode::FitWidth => {
                        let tw = tw?;
                        Ok((tw, round_dimension(tw as f64 * h / w)?))
                    }
                    ScaleMode::FitHeight => {
                        let th = th?;
                        Ok((round_dimension(th as f64 * w / h)?, th))
                    }
                    ScaleMode::FitInside => {
                        let (tw, th) = (tw?, th?);
                        let factor = (tw as f64 / w).min(th as f64 / h);
                        Ok((
                            round_dimension(w * factor)?.min(tw),
                            round_dimension(h * factor)?.min(th),
                        ))
                    }
                    ScaleMode::Fill => Ok((tw?, th?)),
                }
            }
            Scale::Percent(percent) => {
                if !percent.is_finite() || percent <= 0.0 {
                    return Err(TransformError::invalid(format!(
                        "scale percentage must be finite and positive, got {percent}"
                    )));
                }
                let factor = percent * rf.divisor();
                if factor == 1.0 {
                    return Ok((width, height));
                }
                Ok((round_dimension(w * factor)?, round_dimension(h * factor)?))
            }
        }
    }
}

fn require_target(mode: ScaleMode, name: &str, value: Option<u32>) -> Result<u32, TransformError> {
    match value {
        Some(v) if v > 0 => Ok(v),
        Some(_) => Err(TransformError::invalid(format!(
            "{mode:?} scale {name} must be positive"
        ))),
        None => Err(TransformError::invalid(format!(
            "{mode:?} scale requires a target {name}"
        ))),
    }
}

/// Round a computed dimension, never below one pixel.
fn round_dimension(value: f64) -> Result<u32, TransformError> {
    let rounded = value.round().max(1.0);
    if rounded > u32::MAX as f64 {
        return Err(TransformError::invalid(format!(
            "scaled dimension {rounded} is too large"
        )));
    }
    Ok(rounded as u32)
}

/// Scale a raster to the size described by `scale`.
///
/// Shrinking axes are area averaged and growing axes bilinearly
/// interpolated. Bitonal rasters are resampled as 8-bit gray and
/// re-thresholded at 50%.
///
/// # Returns
///
/// - `Cow::Borrowed` when the computed size equals the current size
/// - `Cow::Owned` with a raster of the same variant otherwise
///
/// # Example
///
/// ```text
/// 100x100 buffer at rf 1, Scale::percent(0.25) -> 50x50
/// 100x100 buffer at rf 1, Scale::percent(0.5)  -> unchanged
/// ```
pub fn scale_image<'a>(
    raster: &'a Raster,
    scale: &Scale,
    rf: ReductionFactor,
) -> Result<Cow<'a, Raster>, TransformError> {
    let src = raster.dimensions();
    let (width, height) = scale.target_size(src, rf)?;

    if (width, height) == src {
        trace!(?scale, rf = rf.factor(), "Scale keeps the current size");
        return Ok(Cow::Borrowed(raster));
    }

    debug!(
        src_width = src.0,
        src_height = src.1,
        width,
        height,
        rf = rf.factor(),
        "Scaling raster"
    );

    Ok(Cow::Owned(map_buffer!(
        raster,
        |buf| resample(buf, width, height),
        |bits| {
            let gray = resample(&bits.to_gray8(), width, height);
            Raster::Bitonal(BitonalImage::from_gray8(&gray))
        }
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Gray16Image;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn create_test_image(width: u32, height: u32) -> Raster {
        Raster::Rgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 255) / width.max(1)) as u8,
                ((y * 255) / height.max(1)) as u8,
                128,
            ])
        }))
    }

    #[test]
    fn test_full_scale_is_identity() {
        let img = create_test_image(100, 100);
        let result = scale_image(&img, &Scale::Full, ReductionFactor::new(2)).unwrap();
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result.storage_ptr(), img.storage_ptr());
    }

    #[test]
    fn test_empty_raster_fails() {
        let img = Raster::Rgb8(RgbImage::new(0, 10));
        for scale in [Scale::percent(0.5), Scale::fit_width(20), Scale::fill(4, 4)] {
            let err = scale_image(&img, &scale, ReductionFactor::NONE).unwrap_err();
            assert!(matches!(err, TransformError::InvalidOperationParameter(_)));
        }
        assert!(matches!(
            scale_image(&img, &Scale::Full, ReductionFactor::NONE).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_fit_width_landscape() {
        let img = create_test_image(600, 400);
        let result = scale_image(&img, &Scale::fit_width(300), ReductionFactor::NONE).unwrap();
        assert_eq!(result.dimensions(), (300, 200));
    }

    #[test]
    fn test_fit_height_portrait() {
        let img = create_test_image(400, 600);
        let result = scale_image(&img, &Scale::fit_height(300), ReductionFactor::NONE).unwrap();
        assert_eq!(result.dimensions(), (200, 300));
    }

    #[test]
    fn test_fit_inside() {
        let img = create_test_image(100, 100);
        let result = scale_image(&img, &Scale::fit_inside(50, 50), ReductionFactor::NONE).unwrap();
        assert_eq!(result.dimensions(), (50, 50));

        assert_eq!(
            Scale::fit_inside(200, 50).target_size((6000, 4000), ReductionFactor::NONE),
            Ok((75, 50))
        );
    }

    #[test]
    fn test_absolute_ignores_reduction_factor() {
        let img = create_test_image(100, 100);
        let result = scale_image(&img, &Scale::fit_inside(50, 50), ReductionFactor::new(1)).unwrap();
        assert_eq!(result.dimensions(), (50, 50));
    }

    #[test]
    fn test_fill_ignores_aspect() {
        let img = create_test_image(100, 100);
        let result = scale_image(&img, &Scale::fill(30, 70), ReductionFactor::NONE).unwrap();
        assert_eq!(result.dimensions(), (30, 70));
    }

    #[test]
    fn test_fit_to_current_size_is_identity() {
        let img = create_test_image(100, 50);
        let result = scale_image(&img, &Scale::fit_width(100), ReductionFactor::NONE).unwrap();
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_percent_scale_with_reduction_factor() {
        let img = create_test_image(100, 100);

        let result = scale_image(&img, &Scale::percent(0.25), ReductionFactor::new(1)).unwrap();
        assert_eq!(result.dimensions(), (50, 50));

        let result = scale_image(&img, &Scale::percent(0.5), ReductionFactor::new(1)).unwrap();
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_percent_upscale() {
        let img = create_test_image(10, 20);
        let result = scale_image(&img, &Scale::percent(1.5), ReductionFactor::NONE).unwrap();
        assert_eq!(result.dimensions(), (15, 30));
    }

    #[test]
    fn test_missing_or_zero_targets_fail() {
        let img = create_test_image(10, 10);
        for scale in [
            Scale::fit_width(0),
            Scale::fill(10, 0),
            Scale::Absolute {
                mode: ScaleMode::FitInside,
                width: Some(10),
                height: None,
            },
            Scale::Absolute {
                mode: ScaleMode::FitHeight,
                width: Some(10),
                height: None,
            },
        ] {
            let err = scale_image(&img, &scale, ReductionFactor::NONE).unwrap_err();
            assert!(matches!(err, TransformError::InvalidOperationParameter(_)));
        }
    }

    #[test]
    fn test_bad_percent_fails() {
        let img = create_test_image(10, 10);
        for p in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            assert!(scale_image(&img, &Scale::percent(p), ReductionFactor::NONE).is_err());
        }
    }

    #[test]
    fn test_tiny_percent_keeps_one_pixel() {
        let img = create_test_image(10, 10);
        let result = scale_image(&img, &Scale::percent(0.001), ReductionFactor::NONE).unwrap();
        assert_eq!(result.dimensions(), (1, 1));
    }

    #[test]
    fn test_scale_keeps_16_bit_variant() {
        let img = Raster::Gray16(Gray16Image::from_pixel(8, 8, Luma([40000])));
        let result = scale_image(&img, &Scale::fill(3, 5), ReductionFactor::NONE).unwrap();
        let Raster::Gray16(buf) = &*result else {
            panic!("expected 16-bit gray");
        };
        assert_eq!(buf.dimensions(), (3, 5));
        assert!(buf.pixels().all(|p| p[0] == 40000));
    }

    #[test]
    fn test_bitonal_scale_stays_bitonal() {
        let bits = BitonalImage::from_fn(8, 8, |x, _| x < 4);
        let img = Raster::Bitonal(bits);
        let result = scale_image(&img, &Scale::fill(4, 4), ReductionFactor::NONE).unwrap();
        let Raster::Bitonal(out) = &*result else {
            panic!("expected bitonal");
        };
        assert_eq!(out.dimensions(), (4, 4));
        assert!(out.get(0, 0) && out.get(1, 3));
        assert!(!out.get(2, 0) && !out.get(3, 3));
    }

    #[test]
    fn test_downscale_averages() {
        let img = Raster::Gray8(GrayImage::from_fn(4, 4, |x, _| {
            Luma([if x % 2 == 0 { 0 } else { 200 }])
        }));
        let result = scale_image(&img, &Scale::fill(2, 2), ReductionFactor::NONE).unwrap();
        assert!(
            (0..2).all(|x| result.rgba8_at(x, 1)[0] == 100),
            "2x2 blocks should average to 100"
        );
    }

    #[test]
    fn test_scale_serde() {
        let scale: Scale = serde_json::from_str(
            r#"{"absolute": {"mode": "fit_inside", "width": 50, "height": 40}}"#,
        )
        .unwrap();
        assert_eq!(scale, Scale::fit_inside(50, 40));

        let scale: Scale = serde_json::from_str(r#"{"percent": 0.5}"#).unwrap();
        assert_eq!(scale, Scale::percent(0.5));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================
