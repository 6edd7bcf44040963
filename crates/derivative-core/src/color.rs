//! Color model normalization: bit-depth reduction, alpha removal and
//! gray/bitonal conversion.
//!
//! Every function returns `Cow::Borrowed` when the raster already satisfies
//! the requested model, so a no-op stage never copies pixels.

use std::borrow::Cow;

use image::{Luma, LumaA, Pixel, Rgb, Rgba};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::luminance::{
    calculate_luminance, calculate_luminance_u16, calculate_luminance_u8, is_white,
};
use crate::raster::{BitonalImage, Color, Raster};
use crate::sample::{color_channels, map_pixels, narrow, widen, Buffer, Sample};

/// Target of a color transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTransform {
    /// Luminance only, keeping depth and alpha presence.
    Gray,
    /// Packed 1-bit black and white, always opaque.
    Bitonal,
}

/// Luminance of a pixel in its own sample range.
pub(crate) fn luminance_of<P>(pixel: &P) -> f32
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let c = pixel.channels();
    if color_channels::<P>() == 1 {
        c[0].as_f32()
    } else {
        calculate_luminance(c[0].as_f32(), c[1].as_f32(), c[2].as_f32())
    }
}

/// Narrow every 16-bit component to 8 bits.
///
/// Rasters whose components are already 8 bits or fewer (including bitonal)
/// are returned unchanged. Samples are rescaled linearly from `0..=65535` to
/// `0..=255` with rounding; layout and alpha presence are kept.
pub fn reduce_to_8_bits(raster: &Raster) -> Cow<'_, Raster> {
    let reduced = match raster {
        Raster::Gray16(buf) => Raster::Gray8(map_pixels(buf, |p| Luma([narrow(p[0])]))),
        Raster::GrayAlpha16(buf) => Raster::GrayAlpha8(map_pixels(buf, |p| LumaA(p.0.map(narrow)))),
        Raster::Rgb16(buf) => Raster::Rgb8(map_pixels(buf, |p| Rgb(p.0.map(narrow)))),
        Raster::RgbAlpha16(buf) => Raster::RgbAlpha8(map_pixels(buf, |p| Rgba(p.0.map(narrow)))),
        Raster::Gray8(_)
        | Raster::GrayAlpha8(_)
        | Raster::Rgb8(_)
        | Raster::RgbAlpha8(_)
        | Raster::Bitonal(_) => return Cow::Borrowed(raster),
    };

    debug!(
        width = reduced.width(),
        height = reduced.height(),
        to = ?reduced.color_model(),
        "Reduced raster to 8 bits per component"
    );
    Cow::Owned(reduced)
}

/// Drop the alpha component without blending.
///
/// Color and gray samples are copied verbatim; whatever transparency the
/// raster carried is discarded.
pub fn remove_alpha(raster: &Raster) -> Cow<'_, Raster> {
    let opaque = match raster {
        Raster::GrayAlpha8(buf) => Raster::Gray8(map_pixels(buf, |p| Luma([p[0]]))),
        Raster::GrayAlpha16(buf) => Raster::Gray16(map_pixels(buf, |p| Luma([p[0]]))),
        Raster::RgbAlpha8(buf) => Raster::Rgb8(map_pixels(buf, |p| Rgb([p[0], p[1], p[2]]))),
        Raster::RgbAlpha16(buf) => Raster::Rgb16(map_pixels(buf, |p| Rgb([p[0], p[1], p[2]]))),
        Raster::Gray8(_)
        | Raster::Gray16(_)
        | Raster::Rgb8(_)
        | Raster::Rgb16(_)
        | Raster::Bitonal(_) => return Cow::Borrowed(raster),
    };

    debug!(
        width = opaque.width(),
        height = opaque.height(),
        "Removed alpha channel"
    );
    Cow::Owned(opaque)
}

/// "Over" composite a single sample onto a background sample.
#[inline]
fn flatten<S: Sample>(sample: S, alpha: S, background: f32) -> S {
    let a = alpha.as_f32() / S::MAX;
    S::from_f32(sample.as_f32() * a + background * (1.0 - a))
}

/// Composite the raster over a solid background, producing an opaque raster.
///
/// Each sample becomes `src * a / max + bg * (1 - a / max)`. Gray rasters use
/// the luminance of `background`; 16-bit rasters use it widened to 16 bits.
pub fn remove_alpha_with_background(raster: &Raster, background: Color) -> Cow<'_, Raster> {
    let gray8 = background.luminance() as f32;
    let gray16 = widen(background.luminance()) as f32;
    let rgb8 = [background.red, background.green, background.blue].map(|c| c as f32);
    let rgb16 = [background.red, background.green, background.blue].map(|c| widen(c) as f32);

    let opaque = match raster {
        Raster::GrayAlpha8(buf) => Raster::Gray8(map_pixels(buf, |p| {
            Luma([flatten(p[0], p[1], gray8)])
        })),
        Raster::GrayAlpha16(buf) => Raster::Gray16(map_pixels(buf, |p| {
            Luma([flatten(p[0], p[1], gray16)])
        })),
        Raster::RgbAlpha8(buf) => Raster::Rgb8(map_pixels(buf, |p| {
            Rgb([
                flatten(p[0], p[3], rgb8[0]),
                flatten(p[1], p[3], rgb8[1]),
                flatten(p[2], p[3], rgb8[2]),
            ])
        })),
        Raster::RgbAlpha16(buf) => Raster::Rgb16(map_pixels(buf, |p| {
            Rgb([
                flatten(p[0], p[3], rgb16[0]),
                flatten(p[1], p[3], rgb16[1]),
                flatten(p[2], p[3], rgb16[2]),
            ])
        })),
        Raster::Gray8(_)
        | Raster::Gray16(_)
        | Raster::Rgb8(_)
        | Raster::Rgb16(_)
        | Raster::Bitonal(_) => return Cow::Borrowed(raster),
    };

    debug!(
        width = opaque.width(),
        height = opaque.height(),
        background = %background,
        "Flattened alpha onto background color"
    );
    Cow::Owned(opaque)
}

/// Threshold every pixel's luminance at the middle of its sample range.
fn threshold<P>(buf: &Buffer<P>) -> BitonalImage
where
    P: Pixel,
    P::Subpixel: Sample,
{
    BitonalImage::from_fn(buf.width(), buf.height(), |x, y| {
        is_white(luminance_of(buf.get_pixel(x, y)), <P::Subpixel as Sample>::MAX)
    })
}

fn to_bitonal(raster: &Raster) -> Option<BitonalImage> {
    match raster {
        Raster::Gray8(buf) => Some(threshold(buf)),
        Raster::Gray16(buf) => Some(threshold(buf)),
        Raster::GrayAlpha8(buf) => Some(threshold(buf)),
        Raster::GrayAlpha16(buf) => Some(threshold(buf)),
        Raster::Rgb8(buf) => Some(threshold(buf)),
        Raster::Rgb16(buf) => Some(threshold(buf)),
        Raster::RgbAlpha8(buf) => Some(threshold(buf)),
        Raster::RgbAlpha16(buf) => Some(threshold(buf)),
        Raster::Bitonal(_) => None,
    }
}

fn to_gray(raster: &Raster) -> Option<Raster> {
    match raster {
        Raster::Rgb8(buf) => Some(Raster::Gray8(map_pixels(buf, |p| {
            Luma([calculate_luminance_u8(p[0], p[1], p[2])])
        }))),
        Raster::Rgb16(buf) => Some(Raster::Gray16(map_pixels(buf, |p| {
            Luma([calculate_luminance_u16(p[0], p[1], p[2])])
        }))),
        Raster::RgbAlpha8(buf) => Some(Raster::GrayAlpha8(map_pixels(buf, |p| {
            LumaA([calculate_luminance_u8(p[0], p[1], p[2]), p[3]])
        }))),
        Raster::RgbAlpha16(buf) => Some(Raster::GrayAlpha16(map_pixels(buf, |p| {
            LumaA([calculate_luminance_u16(p[0], p[1], p[2]), p[3]])
        }))),
        Raster::Gray8(_)
        | Raster::Gray16(_)
        | Raster::GrayAlpha8(_)
        | Raster::GrayAlpha16(_)
        | Raster::Bitonal(_) => None,
    }
}

/// Convert the raster to gray or bitonal.
///
/// - [`ColorTransform::Gray`] leaves gray and bitonal rasters untouched and
///   otherwise produces a gray raster of the same depth and alpha presence.
/// - [`ColorTransform::Bitonal`] leaves bitonal rasters untouched and
///   otherwise thresholds luminance at 50% of the range into an opaque
///   packed 1-bit raster.
pub fn transform_color(raster: &Raster, kind: ColorTransform) -> Cow<'_, Raster> {
    let converted = match kind {
        ColorTransform::Gray => to_gray(raster),
        ColorTransform::Bitonal => to_bitonal(raster).map(Raster::Bitonal),
    };

    match converted {
        Some(out) => {
            debug!(
                ?kind,
                width = out.width(),
                height = out.height(),
                from = ?raster.color_model(),
                "Transformed color model"
            );
            Cow::Owned(out)
        }
        None => Cow::Borrowed(raster),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{BitDepth, Components, Gray16Image, GrayAlpha16Image, Rgb16Image, Rgba16Image};
    use image::{GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

    fn assert_same(input: &Raster, output: &Cow<'_, Raster>) {
        assert!(matches!(output, Cow::Borrowed(_)));
        assert_eq!(input.storage_ptr(), output.storage_ptr());
    }

    #[test]
    fn test_reduce_8_bit_gray_is_identity() {
        let raster = Raster::Gray8(GrayImage::new(20, 20));
        assert_same(&raster, &reduce_to_8_bits(&raster));
    }

    #[test]
    fn test_reduce_8_bit_rgba_is_identity() {
        let raster = Raster::RgbAlpha8(RgbaImage::new(20, 20));
        assert_same(&raster, &reduce_to_8_bits(&raster));
    }

    #[test]
    fn test_reduce_bitonal_is_identity() {
        let raster = Raster::Bitonal(BitonalImage::new(20, 20));
        assert_same(&raster, &reduce_to_8_bits(&raster));
    }

    #[test]
    fn test_reduce_16_bit_gray() {
        let raster = Raster::Gray16(Gray16Image::from_pixel(20, 20, Luma([65535])));
        let result = reduce_to_8_bits(&raster);
        let model = result.color_model();
        assert_eq!(model.component_size(), 8);
        assert!(!model.has_alpha);
        assert!(model.is_packed());
        assert!(matches!(*result, Raster::Gray8(_)));
        assert_eq!(result.rgba8_at(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_reduce_16_bit_gray_alpha() {
        let raster = Raster::GrayAlpha16(GrayAlpha16Image::from_pixel(
            20,
            20,
            LumaA([32896, 65535]),
        ));
        let result = reduce_to_8_bits(&raster);
        assert_eq!(result.color_model().component_size(), 8);
        assert!(result.has_alpha());
        assert!(matches!(*result, Raster::GrayAlpha8(_)));
        assert_eq!(result.rgba8_at(3, 3), [128, 128, 128, 255]);
    }

    #[test]
    fn test_reduce_16_bit_rgba() {
        let raster = Raster::RgbAlpha16(Rgba16Image::from_pixel(20, 20, Rgba([0, 257, 65535, 0])));
        let result = reduce_to_8_bits(&raster);
        assert!(matches!(*result, Raster::RgbAlpha8(_)));
        assert!(result.color_model().is_packed());
        assert_eq!(result.rgba8_at(0, 0), [0, 1, 255, 0]);
    }

    #[test]
    fn test_reduce_16_bit_rgb_is_generic_8_bit() {
        let raster = Raster::Rgb16(Rgb16Image::new(4, 4));
        let result = reduce_to_8_bits(&raster);
        assert!(matches!(*result, Raster::Rgb8(_)));
        assert_eq!(result.dimensions(), (4, 4));
    }

    #[test]
    fn test_remove_alpha_on_opaque_rasters_is_identity() {
        let rasters = [
            Raster::Gray8(GrayImage::new(20, 20)),
            Raster::Gray16(Gray16Image::new(20, 20)),
            Raster::Rgb8(RgbImage::new(20, 20)),
            Raster::Rgb16(Rgb16Image::new(20, 20)),
            Raster::Bitonal(BitonalImage::new(20, 20)),
        ];
        for raster in &rasters {
            assert_same(raster, &remove_alpha(raster));
        }
    }

    #[test]
    fn test_remove_alpha_drops_channel() {
        let rasters = [
            Raster::GrayAlpha8(GrayAlphaImage::new(20, 20)),
            Raster::GrayAlpha16(GrayAlpha16Image::new(20, 20)),
            Raster::RgbAlpha8(RgbaImage::new(20, 20)),
            Raster::RgbAlpha16(Rgba16Image::new(20, 20)),
        ];
        for raster in &rasters {
            let result = remove_alpha(raster);
            assert!(!result.has_alpha());
            assert_eq!(
                result.color_model().bit_depth,
                raster.color_model().bit_depth
            );
            assert_eq!(
                result.color_model().components,
                raster.color_model().components
            );
        }
    }

    #[test]
    fn test_remove_alpha_copies_samples_verbatim() {
        let raster = Raster::RgbAlpha8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 0])));
        let result = remove_alpha(&raster);
        assert_eq!(result.rgba8_at(1, 1), [10, 20, 30, 255]);
    }

    #[test]
    fn test_remove_alpha_with_background_transparent_pixel() {
        let mut buf = RgbaImage::from_pixel(64, 56, Rgba([0, 255, 0, 255]));
        buf.put_pixel(0, 0, Rgba([0, 255, 0, 0]));
        let raster = Raster::RgbAlpha8(buf);

        let result = remove_alpha_with_background(&raster, Color::RED);
        assert!(!result.has_alpha());
        assert_eq!(result.rgba8_at(0, 0), [255, 0, 0, 255]);
        assert_eq!(result.rgba8_at(1, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn test_remove_alpha_with_background_half_alpha() {
        let raster = Raster::RgbAlpha8(RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128])));
        let result = remove_alpha_with_background(&raster, Color::BLACK);
        let [r, g, b, a] = result.rgba8_at(0, 0);
        assert_eq!(a, 255);
        assert_eq!((r, g, b), (128, 128, 128));
    }

    #[test]
    fn test_remove_alpha_with_background_gray_16() {
        let raster = Raster::GrayAlpha16(GrayAlpha16Image::from_pixel(1, 1, LumaA([0, 0])));
        let result = remove_alpha_with_background(&raster, Color::WHITE);
        match &*result {
            Raster::Gray16(buf) => assert_eq!(buf.get_pixel(0, 0)[0], 65535),
            other => panic!("expected 16-bit gray, got {:?}", other.color_model()),
        }
    }

    #[test]
    fn test_remove_alpha_with_background_opaque_is_identity() {
        let raster = Raster::Rgb8(RgbImage::new(5, 5));
        assert_same(&raster, &remove_alpha_with_background(&raster, Color::RED));
    }

    #[test]
    fn test_gray_on_gray_is_identity() {
        let raster = Raster::Gray8(GrayImage::new(100, 100));
        assert_same(&raster, &transform_color(&raster, ColorTransform::Gray));
    }

    #[test]
    fn test_gray_on_gray_alpha_is_identity() {
        let raster = Raster::GrayAlpha8(GrayAlphaImage::new(100, 100));
        assert_same(&raster, &transform_color(&raster, ColorTransform::Gray));
    }

    #[test]
    fn test_rgb_to_gray() {
        let raster = Raster::Rgb8(RgbImage::from_pixel(100, 100, Rgb([255, 0, 0])));
        let result = transform_color(&raster, ColorTransform::Gray);
        assert!(matches!(*result, Raster::Gray8(_)));
        let [r, g, b, a] = result.rgba8_at(0, 0);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(r, 54);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_rgba_16_to_gray_keeps_depth_and_alpha() {
        let raster = Raster::RgbAlpha16(Rgba16Image::from_pixel(
            100,
            100,
            Rgba([65535, 0, 0, 65535]),
        ));
        let result = transform_color(&raster, ColorTransform::Gray);
        let model = result.color_model();
        assert_eq!(model.components, Components::Gray);
        assert_eq!(model.bit_depth, BitDepth::Sixteen);
        assert_eq!(model.component_size(), 16);
        assert!(model.has_alpha);
        let [r, g, b, _] = result.rgba8_at(0, 0);
        assert!(r == g && g == b);
    }

    #[test]
    fn test_bitonal_on_bitonal_is_identity() {
        let raster = Raster::Bitonal(BitonalImage::new(100, 100));
        assert_same(&raster, &transform_color(&raster, ColorTransform::Bitonal));
    }

    #[test]
    fn test_rgb_8_to_bitonal() {
        let cyan = Raster::Rgb8(RgbImage::from_pixel(100, 100, Rgb([0, 255, 255])));
        let result = transform_color(&cyan, ColorTransform::Bitonal);
        assert!(matches!(*result, Raster::Bitonal(_)));
        assert_eq!(result.color_model().component_size(), 1);
        assert_eq!(result.rgba8_at(0, 0), [255, 255, 255, 255]);

        let red = Raster::Rgb8(RgbImage::from_pixel(100, 100, Rgb([255, 0, 0])));
        let result = transform_color(&red, ColorTransform::Bitonal);
        assert!(matches!(*result, Raster::Bitonal(_)));
        assert_eq!(result.rgba8_at(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_rgba_16_to_bitonal_discards_alpha() {
        let cyan = Raster::RgbAlpha16(Rgba16Image::from_pixel(
            20,
            20,
            Rgba([0, 65535, 65535, 0]),
        ));
        let result = transform_color(&cyan, ColorTransform::Bitonal);
        assert!(!result.has_alpha());
        assert_eq!(result.rgba8_at(0, 0), [255, 255, 255, 255]);

        let red = Raster::RgbAlpha16(Rgba16Image::from_pixel(
            20,
            20,
            Rgba([65535, 0, 0, 65535]),
        ));
        let result = transform_color(&red, ColorTransform::Bitonal);
        assert_eq!(result.rgba8_at(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_gray_to_bitonal_threshold() {
        let raster = Raster::Gray8(GrayImage::from_fn(2, 1, |x, _| Luma([[127, 128][x as usize]])));
        let result = transform_color(&raster, ColorTransform::Bitonal);
        assert_eq!(result.rgba8_at(0, 0), [0, 0, 0, 255]);
        assert_eq!(result.rgba8_at(1, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_color_transform_serde() {
        let kind: ColorTransform = serde_json::from_str("\"bitonal\"").unwrap();
        assert_eq!(kind, ColorTransform::Bitonal);
    }
}
