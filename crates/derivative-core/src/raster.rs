//! The raster type passed between engine stages.
//!
//! A [`Raster`] is a closed set of pixel layouts: gray or RGB, 8 or 16 bits
//! per component, with or without alpha, plus packed 1-bit bitonal. Each
//! operation matches exhaustively over the variants, so a stage always knows
//! the exact layout it produces.

use std::fmt;
use std::str::FromStr;

use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageBuffer, Luma, LumaA, Rgb, RgbImage, Rgba,
    RgbaImage,
};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::luminance::calculate_luminance_u8;
use crate::sample::narrow;

/// 16-bit gray buffer.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;
/// 16-bit gray buffer with alpha.
pub type GrayAlpha16Image = ImageBuffer<LumaA<u16>, Vec<u16>>;
/// 16-bit RGB buffer.
pub type Rgb16Image = ImageBuffer<Rgb<u16>, Vec<u16>>;
/// 16-bit RGB buffer with alpha.
pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Apply an expression to the buffer of every multi-bit variant, rewrapping
/// the result in the same variant. Bitonal rasters take a separate arm that
/// must evaluate to a whole `Raster`.
macro_rules! map_buffer {
    ($raster:expr, |$buf:ident| $body:expr, |$bits:ident| $bitonal:expr) => {
        match $raster {
            $crate::raster::Raster::Gray8($buf) => $crate::raster::Raster::Gray8($body),
            $crate::raster::Raster::Gray16($buf) => $crate::raster::Raster::Gray16($body),
            $crate::raster::Raster::GrayAlpha8($buf) => $crate::raster::Raster::GrayAlpha8($body),
            $crate::raster::Raster::GrayAlpha16($buf) => {
                $crate::raster::Raster::GrayAlpha16($body)
            }
            $crate::raster::Raster::Rgb8($buf) => $crate::raster::Raster::Rgb8($body),
            $crate::raster::Raster::Rgb16($buf) => $crate::raster::Raster::Rgb16($body),
            $crate::raster::Raster::RgbAlpha8($buf) => $crate::raster::Raster::RgbAlpha8($body),
            $crate::raster::Raster::RgbAlpha16($buf) => $crate::raster::Raster::RgbAlpha16($body),
            $crate::raster::Raster::Bitonal($bits) => $bitonal,
        }
    };
}

pub(crate) use map_buffer;

/// Component layout of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Components {
    Gray,
    Rgb,
}

/// Bits per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitDepth {
    One,
    Eight,
    Sixteen,
}

impl BitDepth {
    /// Number of bits per component.
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::One => 1,
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

/// Description of how a raster stores its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorModel {
    pub components: Components,
    pub bit_depth: BitDepth,
    pub has_alpha: bool,
}

impl ColorModel {
    /// Bits per component (uniform across components).
    pub fn component_size(&self) -> u8 {
        self.bit_depth.bits()
    }

    /// Number of stored components per pixel, alpha included.
    pub fn channel_count(&self) -> u8 {
        let color = match self.components {
            Components::Gray => 1,
            Components::Rgb => 3,
        };
        color + u8::from(self.has_alpha)
    }

    /// Whether a standard packed pixel representation exists for this model.
    ///
    /// Gray, 8-bit RGB, 8-bit RGBA and bitonal layouts are packed; gray with
    /// alpha and 16-bit color layouts are stored as generic component
    /// rasters. The distinction affects storage only, never sample values.
    pub fn is_packed(&self) -> bool {
        match (self.components, self.bit_depth, self.has_alpha) {
            (_, BitDepth::One, _) => true,
            (Components::Gray, _, false) => true,
            (Components::Rgb, BitDepth::Eight, _) => true,
            (Components::Gray, _, true) => false,
            (Components::Rgb, BitDepth::Sixteen, _) => false,
        }
    }
}

/// An 8-bit sRGB color with alpha.
///
/// Serialized as a CSS-style hex string (`#RRGGBB` or `#RRGGBBAA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::rgba(red, green, blue, 255)
    }

    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// BT.709 luminance of the color components.
    pub fn luminance(&self) -> u8 {
        calculate_luminance_u8(self.red, self.green, self.blue)
    }

    /// Components normalized to 0.0..=1.0, in RGBA order.
    pub(crate) fn to_unit(self) -> [f32; 4] {
        [
            self.red as f32 / 255.0,
            self.green as f32 / 255.0,
            self.blue as f32 / 255.0,
            self.alpha as f32 / 255.0,
        ]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.red, self.green, self.blue, self.alpha
            )
        }
    }
}

impl FromStr for Color {
    type Err = TransformError;

    /// Parse `#RGB`, `#RRGGBB`, `#RRGGBBAA` or one of a few CSS color names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "black" => return Ok(Color::BLACK),
            "white" => return Ok(Color::WHITE),
            "red" => return Ok(Color::RED),
            "green" | "lime" => return Ok(Color::GREEN),
            "blue" => return Ok(Color::BLUE),
            "cyan" | "aqua" => return Ok(Color::CYAN),
            "transparent" => return Ok(Color::TRANSPARENT),
            _ => {}
        }

        let invalid = || TransformError::invalid(format!("invalid color: {trimmed:?}"));
        let hex = trimmed.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());

        match hex.len() {
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| v * 17)
                        .map_err(|_| invalid())
                };
                Ok(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = TransformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// A packed 1-bit black/white image.
///
/// Rows are padded to whole bytes; the most significant bit of each byte is
/// the leftmost pixel and a set bit is white.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitonalImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BitonalImage {
    /// Create an all-black image.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = Self::stride_for(width);
        Self {
            width,
            height,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Create an image by evaluating `f(x, y)` (true = white) for each pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut image = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    image.set(x, y, true);
                }
            }
        }
        image
    }

    /// Threshold an 8-bit gray image at the middle of its range.
    pub fn from_gray8(gray: &GrayImage) -> Self {
        Self::from_fn(gray.width(), gray.height(), |x, y| {
            gray.get_pixel(x, y)[0] >= 128
        })
    }

    fn stride_for(width: u32) -> usize {
        (width as usize).div_ceil(8)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Packed row-major bits.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn locate(&self, x: u32, y: u32) -> (usize, u8) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{} bitonal image",
            self.width,
            self.height
        );
        let idx = y as usize * Self::stride_for(self.width) + (x / 8) as usize;
        (idx, 0x80u8 >> (x % 8))
    }

    /// Whether the pixel is white. Panics when out of bounds.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        let (idx, mask) = self.locate(x, y);
        self.data[idx] & mask != 0
    }

    /// Set the pixel to white (`true`) or black. Panics when out of bounds.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, white: bool) {
        let (idx, mask) = self.locate(x, y);
        if white {
            self.data[idx] |= mask;
        } else {
            self.data[idx] &= !mask;
        }
    }

    /// Expand to 8-bit gray (black = 0, white = 255).
    pub fn to_gray8(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

/// A decoded image in one of the supported color models.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    Gray8(GrayImage),
    Gray16(Gray16Image),
    GrayAlpha8(GrayAlphaImage),
    GrayAlpha16(GrayAlpha16Image),
    Rgb8(RgbImage),
    Rgb16(Rgb16Image),
    RgbAlpha8(RgbaImage),
    RgbAlpha16(Rgba16Image),
    Bitonal(BitonalImage),
}

impl Raster {
    /// Wrap a decoder's output.
    ///
    /// # Errors
    ///
    /// Floating-point images are rejected with
    /// [`TransformError::UnsupportedColorModel`].
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, TransformError> {
        match image {
            DynamicImage::ImageLuma8(buf) => Ok(Raster::Gray8(buf)),
            DynamicImage::ImageLumaA8(buf) => Ok(Raster::GrayAlpha8(buf)),
            DynamicImage::ImageRgb8(buf) => Ok(Raster::Rgb8(buf)),
            DynamicImage::ImageRgba8(buf) => Ok(Raster::RgbAlpha8(buf)),
            DynamicImage::ImageLuma16(buf) => Ok(Raster::Gray16(buf)),
            DynamicImage::ImageLumaA16(buf) => Ok(Raster::GrayAlpha16(buf)),
            DynamicImage::ImageRgb16(buf) => Ok(Raster::Rgb16(buf)),
            DynamicImage::ImageRgba16(buf) => Ok(Raster::RgbAlpha16(buf)),
            other => Err(TransformError::UnsupportedColorModel(format!(
                "{:?}",
                other.color()
            ))),
        }
    }

    /// Hand the raster to an encoder. Bitonal rasters become 8-bit gray.
    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Raster::Gray8(buf) => DynamicImage::ImageLuma8(buf),
            Raster::Gray16(buf) => DynamicImage::ImageLuma16(buf),
            Raster::GrayAlpha8(buf) => DynamicImage::ImageLumaA8(buf),
            Raster::GrayAlpha16(buf) => DynamicImage::ImageLumaA16(buf),
            Raster::Rgb8(buf) => DynamicImage::ImageRgb8(buf),
            Raster::Rgb16(buf) => DynamicImage::ImageRgb16(buf),
            Raster::RgbAlpha8(buf) => DynamicImage::ImageRgba8(buf),
            Raster::RgbAlpha16(buf) => DynamicImage::ImageRgba16(buf),
            Raster::Bitonal(bits) => DynamicImage::ImageLuma8(bits.to_gray8()),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Raster::Gray8(buf) => buf.dimensions(),
            Raster::Gray16(buf) => buf.dimensions(),
            Raster::GrayAlpha8(buf) => buf.dimensions(),
            Raster::GrayAlpha16(buf) => buf.dimensions(),
            Raster::Rgb8(buf) => buf.dimensions(),
            Raster::Rgb16(buf) => buf.dimensions(),
            Raster::RgbAlpha8(buf) => buf.dimensions(),
            Raster::RgbAlpha16(buf) => buf.dimensions(),
            Raster::Bitonal(bits) => bits.dimensions(),
        }
    }

    pub fn color_model(&self) -> ColorModel {
        let (components, bit_depth, has_alpha) = match self {
            Raster::Gray8(_) => (Components::Gray, BitDepth::Eight, false),
            Raster::Gray16(_) => (Components::Gray, BitDepth::Sixteen, false),
            Raster::GrayAlpha8(_) => (Components::Gray, BitDepth::Eight, true),
            Raster::GrayAlpha16(_) => (Components::Gray, BitDepth::Sixteen, true),
            Raster::Rgb8(_) => (Components::Rgb, BitDepth::Eight, false),
            Raster::Rgb16(_) => (Components::Rgb, BitDepth::Sixteen, false),
            Raster::RgbAlpha8(_) => (Components::Rgb, BitDepth::Eight, true),
            Raster::RgbAlpha16(_) => (Components::Rgb, BitDepth::Sixteen, true),
            Raster::Bitonal(_) => (Components::Gray, BitDepth::One, false),
        };
        ColorModel {
            components,
            bit_depth,
            has_alpha,
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.color_model().has_alpha
    }

    /// Address of the backing sample store.
    ///
    /// Two rasters with the same address share one allocation; this is how
    /// callers observe that an operation returned its input untouched.
    pub fn storage_ptr(&self) -> *const u8 {
        match self {
            Raster::Gray8(buf) => buf.as_raw().as_ptr(),
            Raster::Gray16(buf) => buf.as_raw().as_ptr().cast(),
            Raster::GrayAlpha8(buf) => buf.as_raw().as_ptr(),
            Raster::GrayAlpha16(buf) => buf.as_raw().as_ptr().cast(),
            Raster::Rgb8(buf) => buf.as_raw().as_ptr(),
            Raster::Rgb16(buf) => buf.as_raw().as_ptr().cast(),
            Raster::RgbAlpha8(buf) => buf.as_raw().as_ptr(),
            Raster::RgbAlpha16(buf) => buf.as_raw().as_ptr().cast(),
            Raster::Bitonal(bits) => bits.as_raw().as_ptr(),
        }
    }

    /// The pixel at (x, y) as 8-bit sRGB RGBA, opaque when the raster has no
    /// alpha. Panics when out of bounds, like `ImageBuffer::get_pixel`.
    pub fn rgba8_at(&self, x: u32, y: u32) -> [u8; 4] {
        match self {
            Raster::Gray8(buf) => {
                let v = buf.get_pixel(x, y)[0];
                [v, v, v, 255]
            }
            Raster::Gray16(buf) => {
                let v = narrow(buf.get_pixel(x, y)[0]);
                [v, v, v, 255]
            }
            Raster::GrayAlpha8(buf) => {
                let LumaA([v, a]) = *buf.get_pixel(x, y);
                [v, v, v, a]
            }
            Raster::GrayAlpha16(buf) => {
                let LumaA([v, a]) = *buf.get_pixel(x, y);
                let v = narrow(v);
                [v, v, v, narrow(a)]
            }
            Raster::Rgb8(buf) => {
                let Rgb([r, g, b]) = *buf.get_pixel(x, y);
                [r, g, b, 255]
            }
            Raster::Rgb16(buf) => {
                let Rgb([r, g, b]) = *buf.get_pixel(x, y);
                [narrow(r), narrow(g), narrow(b), 255]
            }
            Raster::RgbAlpha8(buf) => buf.get_pixel(x, y).0,
            Raster::RgbAlpha16(buf) => buf.get_pixel(x, y).0.map(narrow),
            Raster::Bitonal(bits) => {
                let v = if bits.get(x, y) { 255 } else { 0 };
                [v, v, v, 255]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_models() {
        let gray = Raster::Gray8(GrayImage::new(2, 2));
        assert_eq!(gray.color_model().component_size(), 8);
        assert_eq!(gray.color_model().channel_count(), 1);
        assert!(gray.color_model().is_packed());

        let gray_alpha = Raster::GrayAlpha16(GrayAlpha16Image::new(2, 2));
        assert_eq!(gray_alpha.color_model().component_size(), 16);
        assert!(gray_alpha.has_alpha());
        assert!(!gray_alpha.color_model().is_packed());

        let rgba = Raster::RgbAlpha8(RgbaImage::new(2, 2));
        assert_eq!(rgba.color_model().channel_count(), 4);
        assert!(rgba.color_model().is_packed());

        let rgb16 = Raster::Rgb16(Rgb16Image::new(2, 2));
        assert!(!rgb16.color_model().is_packed());

        let bits = Raster::Bitonal(BitonalImage::new(9, 1));
        assert_eq!(bits.color_model().component_size(), 1);
        assert!(bits.color_model().is_packed());
    }

    #[test]
    fn test_bitonal_packing() {
        let mut bits = BitonalImage::new(10, 2);
        assert_eq!(bits.as_raw().len(), 4);

        bits.set(0, 0, true);
        bits.set(9, 1, true);
        assert_eq!(bits.as_raw()[0], 0x80);
        assert_eq!(bits.as_raw()[3], 0x40);
        assert!(bits.get(9, 1));
        assert!(!bits.get(8, 1));

        bits.set(0, 0, false);
        assert_eq!(bits.as_raw()[0], 0);
    }

    #[test]
    fn test_bitonal_gray_round_trip() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 127, 128, 255][x as usize]]));
        let bits = BitonalImage::from_gray8(&gray);
        let back = bits.to_gray8();
        assert_eq!(back.as_raw(), &vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_rgba8_at_narrows_16_bit() {
        let raster = Raster::RgbAlpha16(Rgba16Image::from_pixel(
            1,
            1,
            Rgba([65535, 0, 32896, 65535]),
        ));
        assert_eq!(raster.rgba8_at(0, 0), [255, 0, 128, 255]);
    }

    #[test]
    fn test_dynamic_round_trip() {
        let image = DynamicImage::ImageRgb16(Rgb16Image::new(3, 2));
        let raster = Raster::from_dynamic(image).unwrap();
        assert!(matches!(raster, Raster::Rgb16(_)));
        assert_eq!(raster.dimensions(), (3, 2));

        let bits = Raster::Bitonal(BitonalImage::new(3, 2));
        assert!(matches!(bits.into_dynamic(), DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_float_images_rejected() {
        let image = DynamicImage::new_rgb32f(2, 2);
        let err = Raster::from_dynamic(image).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedColorModel(_)));
    }

    #[test]
    fn test_color_parse() {
        assert_eq!("#ff0000".parse::<Color>().unwrap(), Color::RED);
        assert_eq!("#0ff".parse::<Color>().unwrap(), Color::CYAN);
        assert_eq!(
            "#00000080".parse::<Color>().unwrap(),
            Color::rgba(0, 0, 0, 128)
        );
        assert_eq!("White".parse::<Color>().unwrap(), Color::WHITE);
        assert!("#12345".parse::<Color>().is_err());
        assert!("ff0000".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_serde_as_hex() {
        let json = serde_json::to_string(&Color::rgba(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "\"#01020304\"");
        let color: Color = serde_json::from_str("\"#ffffff\"").unwrap();
        assert_eq!(color, Color::WHITE);
    }
}
