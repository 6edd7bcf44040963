//! Image and text overlays.
//!
//! Overlay images are fetched through an [`OverlaySource`] so the engine
//! never touches the network or filesystem itself; text is rasterized by a
//! caller-supplied [`GlyphRenderer`].

use std::collections::HashMap;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{composite, Layer, Position};
use crate::error::{OverlaySourceError, TransformError};
use crate::raster::{Color, Raster};

/// Largest font size a string overlay may ask for, in points.
pub const MAX_FONT_SIZE: f32 = 1000.0;

/// Largest outline width a string overlay may ask for, in pixels.
pub const MAX_STROKE_WIDTH: f32 = 100.0;

/// Resolves overlay image URIs to rasters.
pub trait OverlaySource: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Raster, OverlaySourceError>;
}

impl<F> OverlaySource for F
where
    F: Fn(&str) -> Result<Raster, OverlaySourceError> + Send + Sync,
{
    fn fetch(&self, uri: &str) -> Result<Raster, OverlaySourceError> {
        self(uri)
    }
}

/// Overlay images decoded ahead of time and keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOverlaySource {
    images: HashMap<String, Raster>,
}

impl InMemoryOverlaySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image, replacing any previous one under the same URI.
    pub fn insert(&mut self, uri: impl Into<String>, image: Raster) {
        self.images.insert(uri.into(), image);
    }

    pub fn with(mut self, uri: impl Into<String>, image: Raster) -> Self {
        self.insert(uri, image);
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl OverlaySource for InMemoryOverlaySource {
    fn fetch(&self, uri: &str) -> Result<Raster, OverlaySourceError> {
        self.images
            .get(uri)
            .cloned()
            .ok_or_else(|| OverlaySourceError::NotFound(uri.to_string()))
    }
}

/// Rasterizes one line of text into an 8-bit coverage mask
/// (0 = background, 255 = fully inked).
pub trait GlyphRenderer: Send + Sync {
    fn render(&self, text: &str, font_size: f32) -> GrayImage;
}

/// An image drawn over the raster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageOverlay {
    pub uri: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub inset: u32,
}

/// Text drawn over the raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringOverlay {
    /// Lines are separated by `\n` and left-aligned.
    pub text: String,
    pub position: Position,
    pub inset: u32,
    pub font_size: f32,
    /// Smallest size tried when the text is too wide for the raster.
    pub min_font_size: f32,
    pub color: Color,
    pub stroke_color: Color,
    pub stroke_width: f32,
    /// Drawn behind the text when not fully transparent.
    pub background_color: Color,
}

impl Default for StringOverlay {
    fn default() -> Self {
        Self {
            text: String::new(),
            position: Position::default(),
            inset: 0,
            font_size: 18.0,
            min_font_size: 14.0,
            color: Color::BLACK,
            stroke_color: Color::WHITE,
            stroke_width: 0.0,
            background_color: Color::TRANSPARENT,
        }
    }
}

/// Something drawn over the finished raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Overlay {
    Image(ImageOverlay),
    String(StringOverlay),
}

impl Overlay {
    pub fn position(&self) -> Position {
        match self {
            Overlay::Image(o) => o.position,
            Overlay::String(o) => o.position,
        }
    }

    pub fn inset(&self) -> u32 {
        match self {
            Overlay::Image(o) => o.inset,
            Overlay::String(o) => o.inset,
        }
    }
}

/// Fetch the raster an image overlay refers to.
///
/// # Errors
///
/// [`TransformError::OverlaySource`] when the source cannot provide it.
pub fn get_overlay_image(
    overlay: &ImageOverlay,
    source: &dyn OverlaySource,
) -> Result<Raster, TransformError> {
    let image = source.fetch(&overlay.uri)?;
    debug!(
        uri = %overlay.uri,
        width = image.width(),
        height = image.height(),
        "Fetched overlay image"
    );
    Ok(image)
}

/// Draw an overlay onto a copy of the raster.
///
/// Image overlays are composited at their anchored position. String
/// overlays are rendered line by line, shrinking the font one point at a
/// time (down to `min_font_size`) until the block fits between the insets;
/// text that never fits is skipped.
///
/// `renderer` may be `None` when only image overlays are used.
///
/// # Errors
///
/// - [`TransformError::OverlaySource`] when an overlay image cannot be
///   fetched
/// - [`TransformError::InvalidOperationParameter`] for a string overlay with
///   bad font or stroke values, or without a renderer
pub fn apply_overlay(
    raster: &Raster,
    overlay: &Overlay,
    source: &dyn OverlaySource,
    renderer: Option<&dyn GlyphRenderer>,
) -> Result<Raster, TransformError> {
    let canvas = raster.dimensions();
    let layer = match overlay {
        Overlay::Image(image) => Some(Layer::from_raster(&get_overlay_image(image, source)?)),
        Overlay::String(string) => {
            let renderer = renderer.ok_or_else(|| {
                TransformError::invalid("string overlays need a glyph renderer")
            })?;
            render_string(string, canvas, renderer)?
        }
    };

    let Some(layer) = layer else {
        return Ok(raster.clone());
    };

    let (x, y) = overlay
        .position()
        .anchor(canvas, layer.dimensions(), overlay.inset());
    debug!(
        position = ?overlay.position(),
        x,
        y,
        overlay_width = layer.dimensions().0,
        overlay_height = layer.dimensions().1,
        "Applying overlay"
    );
    Ok(composite(raster, &layer, x, y))
}

fn validate_string(overlay: &StringOverlay) -> Result<(), TransformError> {
    let sizes = [
        ("font size", overlay.font_size),
        ("minimum font size", overlay.min_font_size),
    ];
    for (name, size) in sizes {
        if !size.is_finite() || size <= 0.0 || size > MAX_FONT_SIZE {
            return Err(TransformError::invalid(format!(
                "{name} must be in (0, {MAX_FONT_SIZE}], got {size}"
            )));
        }
    }
    if !overlay.stroke_width.is_finite()
        || overlay.stroke_width < 0.0
        || overlay.stroke_width > MAX_STROKE_WIDTH
    {
        return Err(TransformError::invalid(format!(
            "stroke width must be in [0, {MAX_STROKE_WIDTH}], got {}",
            overlay.stroke_width
        )));
    }
    Ok(())
}

/// Rendered lines of a text block at one font size.
struct TextBlock {
    lines: Vec<GrayImage>,
    width: u32,
    height: u32,
}

impl TextBlock {
    fn render(text: &str, font_size: f32, renderer: &dyn GlyphRenderer) -> Self {
        let blank_height = font_size.round().max(1.0) as u32;
        let lines: Vec<GrayImage> = text
            .split('\n')
            .map(|line| renderer.render(line, font_size))
            .collect();
        let width = lines.iter().map(|l| l.width()).max().unwrap_or(0);
        let height = lines
            .iter()
            .map(|l| if l.height() == 0 { blank_height } else { l.height() })
            .fold(0u32, u32::saturating_add);
        Self {
            lines,
            width,
            height,
        }
    }
}

/// Lay out a string overlay for a canvas. `None` when it cannot fit.
fn render_string(
    overlay: &StringOverlay,
    canvas: (u32, u32),
    renderer: &dyn GlyphRenderer,
) -> Result<Option<Layer>, TransformError> {
    validate_string(overlay)?;

    let stroke = overlay.stroke_width.round() as u32;
    let padding = if overlay.background_color.alpha > 0 {
        stroke + 1
    } else {
        0
    };
    let margin = stroke + padding;
    let available = canvas.0 as i64 - 2 * overlay.inset as i64;

    let mut font_size = overlay.font_size;
    let block = loop {
        let block = TextBlock::render(&overlay.text, font_size, renderer);
        if block.width as i64 + 2 * margin as i64 <= available {
            break block;
        }
        if font_size - 1.0 < overlay.min_font_size {
            debug!(
                text = %overlay.text,
                font_size,
                min_font_size = overlay.min_font_size,
                available,
                "String overlay does not fit, skipping"
            );
            return Ok(None);
        }
        font_size -= 1.0;
    };

    if block.width == 0 {
        return Ok(None);
    }

    let mut layer = Layer::new(
        block.width + 2 * margin,
        block.height.saturating_add(2 * margin),
        overlay.background_color,
    );

    let mut y = margin as i64;
    for mask in &block.lines {
        if stroke > 0 {
            layer.paint_mask(margin as i64, y, mask, overlay.stroke_color, stroke);
        }
        layer.paint_mask(margin as i64, y, mask, overlay.color, 0);
        y += if mask.height() == 0 {
            font_size.round().max(1.0) as i64
        } else {
            mask.height() as i64
        };
    }

    debug!(
        font_size,
        lines = block.lines.len(),
        width = layer.dimensions().0,
        height = layer.dimensions().1,
        "Rendered string overlay"
    );
    Ok(Some(layer))
}
