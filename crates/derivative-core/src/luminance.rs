//! Luminance calculation using ITU-R BT.709 coefficients.
//!
//! Gray conversion, bitonal thresholding and background flattening of gray
//! rasters all reduce color to luminance through these weights.

/// ITU-R BT.709 coefficient for red channel in luminance calculation.
pub const LUMINANCE_R: f32 = 0.2126;

/// ITU-R BT.709 coefficient for green channel in luminance calculation.
pub const LUMINANCE_G: f32 = 0.7152;

/// ITU-R BT.709 coefficient for blue channel in luminance calculation.
pub const LUMINANCE_B: f32 = 0.0722;

/// Fraction of the sample range at or above which a pixel becomes white when
/// reduced to bitonal.
pub const BITONAL_THRESHOLD: f32 = 0.5;

/// Calculate luminance from RGB values in any common range.
///
/// The result is in the same range as the inputs, so this works unchanged
/// for normalized, 8-bit and 16-bit samples.
#[inline]
pub fn calculate_luminance(r: f32, g: f32, b: f32) -> f32 {
    LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b
}

/// Calculate luminance from u8 RGB values (0 to 255).
#[inline]
pub fn calculate_luminance_u8(r: u8, g: u8, b: u8) -> u8 {
    calculate_luminance(r as f32, g as f32, b as f32)
        .clamp(0.0, 255.0)
        .round() as u8
}

/// Calculate luminance from u16 RGB values (0 to 65535).
#[inline]
pub fn calculate_luminance_u16(r: u16, g: u16, b: u16) -> u16 {
    calculate_luminance(r as f32, g as f32, b as f32)
        .clamp(0.0, 65535.0)
        .round() as u16
}

/// Whether a luminance value in `0..=max` counts as white.
#[inline]
pub fn is_white(luminance: f32, max: f32) -> bool {
    luminance >= max * BITONAL_THRESHOLD
}
