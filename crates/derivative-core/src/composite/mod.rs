//! Compositing onto a raster: image and text overlays, and redactions.
//!
//! Overlays are flattened into a [`Layer`] of normalized RGBA values and then
//! blended "over" the raster at an anchored position, clipped to its bounds.
//! Gray rasters receive the luminance of the blended color; bitonal rasters
//! are composited on an 8-bit gray copy and re-thresholded.

mod overlay;
mod redaction;

use image::{GrayImage, Pixel};
use serde::{Deserialize, Serialize};

pub use overlay::{
    apply_overlay, get_overlay_image, GlyphRenderer, ImageOverlay, InMemoryOverlaySource,
    Overlay, OverlaySource, StringOverlay, MAX_FONT_SIZE, MAX_STROKE_WIDTH,
};
pub use redaction::{apply_redactions, Redaction};

use crate::luminance::calculate_luminance;
use crate::raster::{map_buffer, BitonalImage, Color, Raster};
use crate::sample::{color_channels, has_alpha, Buffer, Sample};

/// Anchor of an overlay within the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    LeftCenter,
    Center,
    RightCenter,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

impl Position {
    /// Top-left corner for an item of `item` size inside `canvas`, kept
    /// `inset` pixels from the anchored edges.
    ///
    /// ```text
    /// left column:  x = inset          top row:    y = inset
    /// center:       x = (W - w) / 2    middle row: y = (H - h) / 2
    /// right column: x = W - w - inset  bottom row: y = H - h - inset
    /// ```
    pub fn anchor(self, canvas: (u32, u32), item: (u32, u32), inset: u32) -> (i64, i64) {
        let (cw, ch) = (canvas.0 as i64, canvas.1 as i64);
        let (iw, ih) = (item.0 as i64, item.1 as i64);
        let inset = inset as i64;

        let left = inset;
        let center = (cw - iw) / 2;
        let right = cw - iw - inset;
        let top = inset;
        let middle = (ch - ih) / 2;
        let bottom = ch - ih - inset;

        match self {
            Position::TopLeft => (left, top),
            Position::TopCenter => (center, top),
            Position::TopRight => (right, top),
            Position::LeftCenter => (left, middle),
            Position::Center => (center, middle),
            Position::RightCenter => (right, middle),
            Position::BottomLeft => (left, bottom),
            Position::BottomCenter => (center, bottom),
            Position::BottomRight => (right, bottom),
        }
    }
}

/// Normalized RGBA, non-premultiplied.
type Rgbaf = [f32; 4];

/// Porter-Duff "over" of non-premultiplied colors.
#[inline]
fn over(dst: Rgbaf, src: Rgbaf) -> Rgbaf {
    let sa = src[3];
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3];
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0.0; 4];
    }

    let mut out = [0.0; 4];
    for i in 0..3 {
        out[i] = (src[i] * sa + dst[i] * da * (1.0 - sa)) / out_a;
    }
    out[3] = out_a;
    out
}

/// A rectangle of normalized RGBA pixels ready to be composited.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Layer {
    width: u32,
    height: u32,
    pixels: Vec<Rgbaf>,
}

impl Layer {
    pub(crate) fn new(width: u32, height: u32, fill: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill.to_unit(); width as usize * height as usize],
        }
    }

    /// Read a raster at its own bit depth.
    pub(crate) fn from_raster(raster: &Raster) -> Self {
        let (width, height) = raster.dimensions();
        let pixels = match raster {
            Raster::Gray8(buf) => unit_pixels(buf),
            Raster::Gray16(buf) => unit_pixels(buf),
            Raster::GrayAlpha8(buf) => unit_pixels(buf),
            Raster::GrayAlpha16(buf) => unit_pixels(buf),
            Raster::Rgb8(buf) => unit_pixels(buf),
            Raster::Rgb16(buf) => unit_pixels(buf),
            Raster::RgbAlpha8(buf) => unit_pixels(buf),
            Raster::RgbAlpha16(buf) => unit_pixels(buf),
            Raster::Bitonal(bits) => unit_pixels(&bits.to_gray8()),
        };
        Self {
            width,
            height,
            pixels,
        }
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn get(&self, x: u32, y: u32) -> Rgbaf {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Paint `color` through a coverage mask placed at (x, y).
    ///
    /// With `spread > 0` the mask is dilated by that many pixels in every
    /// direction first, which turns glyph coverage into an outline.
    pub(crate) fn paint_mask(
        &mut self,
        x: i64,
        y: i64,
        mask: &GrayImage,
        color: Color,
        spread: u32,
    ) {
        let color = color.to_unit();
        if color[3] <= 0.0 {
            return;
        }
        let spread = spread as i64;
        let (mw, mh) = (mask.width() as i64, mask.height() as i64);

        for ly in (y - spread).max(0)..(y + mh + spread).min(self.height as i64) {
            for lx in (x - spread).max(0)..(x + mw + spread).min(self.width as i64) {
                let (mx, my) = (lx - x, ly - y);
                let mut coverage = 0u8;
                for sy in (my - spread).max(0)..=(my + spread).min(mh - 1) {
                    for sx in (mx - spread).max(0)..=(mx + spread).min(mw - 1) {
                        coverage = coverage.max(mask.get_pixel(sx as u32, sy as u32)[0]);
                    }
                }
                if coverage == 0 {
                    continue;
                }

                let idx = ly as usize * self.width as usize + lx as usize;
                let src = [
                    color[0],
                    color[1],
                    color[2],
                    color[3] * coverage as f32 / 255.0,
                ];
                self.pixels[idx] = over(self.pixels[idx], src);
            }
        }
    }
}

#[inline]
fn read_unit<P>(px: &P) -> Rgbaf
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let max = <P::Subpixel as Sample>::MAX;
    let c = px.channels();
    let colors = color_channels::<P>();
    let alpha = if has_alpha::<P>() {
        c[colors].as_f32() / max
    } else {
        1.0
    };
    if colors == 1 {
        let v = c[0].as_f32() / max;
        [v, v, v, alpha]
    } else {
        [c[0].as_f32() / max, c[1].as_f32() / max, c[2].as_f32() / max, alpha]
    }
}

fn unit_pixels<P>(buf: &Buffer<P>) -> Vec<Rgbaf>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    buf.pixels().map(read_unit).collect()
}

#[inline]
fn write_unit<P>(px: &mut P, value: Rgbaf)
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let max = <P::Subpixel as Sample>::MAX;
    let colors = color_channels::<P>();
    let alpha = has_alpha::<P>();
    let c = px.channels_mut();
    if colors == 1 {
        c[0] = <P::Subpixel as Sample>::from_f32(calculate_luminance(value[0], value[1], value[2]) * max);
    } else {
        for i in 0..3 {
            c[i] = <P::Subpixel as Sample>::from_f32(value[i] * max);
        }
    }
    if alpha {
        c[colors] = <P::Subpixel as Sample>::from_f32(value[3] * max);
    }
}

fn blend_layer<P>(buf: &mut Buffer<P>, layer: &Layer, x: i64, y: i64)
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let (bw, bh) = (buf.width() as i64, buf.height() as i64);
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + layer.width as i64).min(bw);
    let y1 = (y + layer.height as i64).min(bh);

    for by in y0..y1 {
        for bx in x0..x1 {
            let src = layer.get((bx - x) as u32, (by - y) as u32);
            if src[3] <= 0.0 {
                continue;
            }
            let px = buf.get_pixel_mut(bx as u32, by as u32);
            let blended = over(read_unit(px), src);
            write_unit(px, blended);
        }
    }
}

/// Blend `layer` over a copy of the raster with its top-left corner at
/// (x, y), clipping whatever falls outside.
pub(crate) fn composite(raster: &Raster, layer: &Layer, x: i64, y: i64) -> Raster {
    map_buffer!(
        raster,
        |buf| {
            let mut out = buf.clone();
            blend_layer(&mut out, layer, x, y);
            out
        },
        |bits| {
            let mut gray = bits.to_gray8();
            blend_layer(&mut gray, layer, x, y);
            Raster::Bitonal(BitonalImage::from_gray8(&gray))
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Rgb16Image;
    use image::{GrayAlphaImage, Luma, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_anchor_corners_with_inset() {
        let canvas = (64, 56);
        let item = (10, 6);
        assert_eq!(Position::TopLeft.anchor(canvas, item, 2), (2, 2));
        assert_eq!(Position::TopRight.anchor(canvas, item, 2), (52, 2));
        assert_eq!(Position::BottomLeft.anchor(canvas, item, 2), (2, 48));
        assert_eq!(Position::BottomRight.anchor(canvas, item, 2), (52, 48));
    }

    #[test]
    fn test_anchor_centers_ignore_inset_on_centered_axis() {
        let canvas = (64, 56);
        let item = (10, 6);
        assert_eq!(Position::Center.anchor(canvas, item, 5), (27, 25));
        assert_eq!(Position::TopCenter.anchor(canvas, item, 5), (27, 5));
        assert_eq!(Position::LeftCenter.anchor(canvas, item, 5), (5, 25));
        assert_eq!(Position::RightCenter.anchor(canvas, item, 5), (49, 25));
        assert_eq!(Position::BottomCenter.anchor(canvas, item, 5), (27, 45));
    }

    #[test]
    fn test_over_opaque_and_transparent() {
        let dst = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(over(dst, [0.0, 0.0, 0.0, 1.0]), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(over(dst, [0.0, 0.0, 0.0, 0.0]), dst);

        let half = over(dst, [0.0, 0.0, 0.0, 0.5]);
        assert!((half[0] - 0.5).abs() < 1e-6);
        assert_eq!(half[3], 1.0);
    }

    #[test]
    fn test_over_onto_transparent_keeps_source_color() {
        let out = over([0.0; 4], [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(out, [1.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_composite_clips_to_bounds() {
        let base = Raster::Rgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let layer = Layer::new(3, 3, Color::RED);
        let out = composite(&base, &layer, 2, -1);

        assert_eq!(out.rgba8_at(2, 0), [255, 0, 0, 255]);
        assert_eq!(out.rgba8_at(3, 1), [255, 0, 0, 255]);
        assert_eq!(out.rgba8_at(3, 2), [255, 255, 255, 255]);
        assert_eq!(out.rgba8_at(1, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_composite_on_gray_uses_luminance() {
        let base = Raster::Gray8(GrayImage::from_pixel(2, 2, Luma([0])));
        let out = composite(&base, &Layer::new(1, 1, Color::RED), 0, 0);
        // 0.2126 * 255
        assert_eq!(out.rgba8_at(0, 0)[0], 54);
        assert!(matches!(out, Raster::Gray8(_)));
    }

    #[test]
    fn test_composite_on_bitonal_rethresholds() {
        let base = Raster::Bitonal(BitonalImage::new(4, 4));
        let out = composite(&base, &Layer::new(2, 2, Color::WHITE), 1, 1);
        let Raster::Bitonal(bits) = out else {
            panic!("expected bitonal");
        };
        assert!(bits.get(1, 1) && bits.get(2, 2));
        assert!(!bits.get(0, 0) && !bits.get(3, 3));
    }

    #[test]
    fn test_composite_fills_transparent_base() {
        let base = Raster::GrayAlpha8(GrayAlphaImage::from_pixel(2, 1, LumaA([0, 0])));
        let out = composite(&base, &Layer::new(1, 1, Color::WHITE), 0, 0);
        assert_eq!(out.rgba8_at(0, 0), [255, 255, 255, 255]);
        assert_eq!(out.rgba8_at(1, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_layer_from_raster() {
        let raster = Raster::RgbAlpha8(RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 51])));
        let layer = Layer::from_raster(&raster);
        assert_eq!(layer.dimensions(), (2, 1));
        assert!((layer.get(1, 0)[3] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_sixteen_bit_overlay_keeps_precision() {
        // 1000 is not a multiple of 257, so an 8-bit detour would change it
        let mark = Raster::Rgb16(Rgb16Image::from_pixel(1, 1, Rgb([1000, 0, 65535])));
        let base = Raster::Rgb16(Rgb16Image::new(2, 2));
        let out = composite(&base, &Layer::from_raster(&mark), 0, 0);

        let Raster::Rgb16(buf) = out else {
            panic!("expected 16-bit rgb");
        };
        assert_eq!(*buf.get_pixel(0, 0), Rgb([1000, 0, 65535]));
        assert_eq!(*buf.get_pixel(1, 1), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_paint_mask_spread_outlines() {
        let mut mask = GrayImage::new(3, 3);
        mask.put_pixel(1, 1, Luma([255]));

        let mut layer = Layer::new(5, 5, Color::TRANSPARENT);
        layer.paint_mask(1, 1, &mask, Color::BLACK, 1);

        // The single covered pixel grows to the 3x3 block around (2, 2)
        assert_eq!(layer.get(1, 1)[3], 1.0);
        assert_eq!(layer.get(3, 3)[3], 1.0);
        assert_eq!(layer.get(0, 0)[3], 0.0);
        assert_eq!(layer.get(4, 2)[3], 0.0);
    }
}
