//! Sample-level helpers shared by the generic raster kernels.
//!
//! Every multi-bit `Raster` variant is an `image::ImageBuffer` whose subpixel
//! is `u8` or `u16`. Kernels are written once against [`Sample`] and work in
//! normalized floating point so that bit depth never changes the math.

use image::{ImageBuffer, Pixel, Primitive};

/// An `ImageBuffer` backed by a `Vec` of its own subpixel type.
pub(crate) type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// A component type with a fixed `[0, MAX]` range.
pub(crate) trait Sample: Primitive + 'static {
    /// Largest representable value as a float.
    const MAX: f32;

    fn as_f32(self) -> f32;

    /// Round to nearest and clamp into range.
    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    const MAX: f32 = 255.0;

    #[inline]
    fn as_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value.clamp(0.0, 255.0).round() as u8
    }
}

impl Sample for u16 {
    const MAX: f32 = 65535.0;

    #[inline]
    fn as_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value.clamp(0.0, 65535.0).round() as u16
    }
}

/// Whether the pixel layout carries a trailing alpha component.
#[inline]
pub(crate) fn has_alpha<P: Pixel>() -> bool {
    matches!(P::CHANNEL_COUNT, 2 | 4)
}

/// Number of leading gray/color components (alpha excluded).
#[inline]
pub(crate) fn color_channels<P: Pixel>() -> usize {
    let count = P::CHANNEL_COUNT as usize;
    if has_alpha::<P>() {
        count - 1
    } else {
        count
    }
}

/// Build a new buffer of the same size by mapping each pixel.
pub(crate) fn map_pixels<P, Q, F>(src: &Buffer<P>, mut f: F) -> Buffer<Q>
where
    P: Pixel,
    Q: Pixel,
    F: FnMut(&P) -> Q,
{
    let mut out = Buffer::<Q>::new(src.width(), src.height());
    for (dst, px) in out.pixels_mut().zip(src.pixels()) {
        *dst = f(px);
    }
    out
}

/// Rescale a 16-bit sample to 8 bits, rounding to nearest.
#[inline]
pub(crate) fn narrow(value: u16) -> u8 {
    ((value as u32 * 255 + 32767) / 65535) as u8
}

/// Widen an 8-bit sample to the full 16-bit range.
#[inline]
pub(crate) fn widen(value: u8) -> u16 {
    value as u16 * 257
}
