//! Mirroring across the vertical or horizontal axis.

use image::imageops;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::raster::{map_buffer, BitonalImage, Raster};

/// Mirror direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transpose {
    /// Swap left and right.
    Horizontal,
    /// Swap top and bottom.
    Vertical,
}

/// Mirror a raster. Always returns a new raster of the same size and variant.
pub fn transpose_image(raster: &Raster, axis: Transpose) -> Raster {
    let (width, height) = raster.dimensions();
    debug!(?axis, width, height, "Transposing raster");

    match axis {
        Transpose::Horizontal => map_buffer!(
            raster,
            |buf| imageops::flip_horizontal(buf),
            |bits| Raster::Bitonal(BitonalImage::from_fn(width, height, |x, y| {
                bits.get(width - 1 - x, y)
            }))
        ),
        Transpose::Vertical => map_buffer!(
            raster,
            |buf| imageops::flip_vertical(buf),
            |bits| Raster::Bitonal(BitonalImage::from_fn(width, height, |x, y| {
                bits.get(x, height - 1 - y)
            }))
        ),
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
