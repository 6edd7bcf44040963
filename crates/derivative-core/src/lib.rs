//! Derivative Core - Raster transform engine
//!
//! This crate turns a decoded source raster into a derivative image: crop,
//! scale, rotate, transpose, color model normalization, enhancement filters,
//! redactions and overlays. Decoders may hand over a raster already reduced
//! by a power of two; the [`ReductionFactor`] travels with it so that every
//! coordinate stays relative to the full-resolution source.
//!
//! Operations that may be a no-op take `&Raster` and return
//! `Cow<'_, Raster>`, borrowing the input when nothing changes.

pub mod color;
pub mod composite;
pub mod config;
pub mod error;
pub mod filter;
pub mod luminance;
pub mod pipeline;
pub mod raster;
mod sample;
pub mod transform;

pub use color::{
    reduce_to_8_bits, remove_alpha, remove_alpha_with_background, transform_color, ColorTransform,
};
pub use composite::{
    apply_overlay, apply_redactions, get_overlay_image, GlyphRenderer, ImageOverlay,
    InMemoryOverlaySource, Overlay, OverlaySource, Position, Redaction, StringOverlay,
};
pub use config::ProcessorConfig;
pub use error::{OverlaySourceError, TransformError};
pub use filter::{sharpen_image, stretch_contrast, Sharpen};
pub use pipeline::{OperationList, Processor};
pub use raster::{BitDepth, BitonalImage, Color, ColorModel, Components, Raster};
pub use transform::{
    compute_rotated_bounds, crop_image, rotate_image, scale_image, transpose_image, Crop,
    CropShape, CropUnit, ReductionFactor, Rotate, Scale, ScaleMode, Transpose,
};
