//! Ordered application of a full operation list.
//!
//! ```text
//! decoded raster (reduced by 2^rf)
//!   -> crop
//!   -> redactions          (coordinates need the cropped, still reduced buffer)
//!   -> scale
//!   -> rotate
//!   -> transpose
//!   -> color transform, 8-bit reduction, background flattening
//!   -> sharpen, contrast stretch
//!   -> overlay
//!   -> derivative raster
//! ```
//!
//! Stages that leave the raster unchanged never copy it, so an empty
//! operation list hands back the very same allocation.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::color::{
    reduce_to_8_bits, remove_alpha_with_background, transform_color, ColorTransform,
};
use crate::composite::{
    apply_overlay, apply_redactions, GlyphRenderer, Overlay, OverlaySource, Redaction,
};
use crate::config::ProcessorConfig;
use crate::error::TransformError;
use crate::filter::{sharpen_image, stretch_contrast, Sharpen};
use crate::raster::Raster;
use crate::transform::{
    crop_image, rotate_image, scale_image, transpose_image, Crop, ReductionFactor, Rotate, Scale,
    Transpose,
};

/// Everything requested for one derivative.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationList {
    pub crop: Crop,
    pub scale: Scale,
    pub rotate: Rotate,
    pub transpose: Option<Transpose>,
    pub color_transform: Option<ColorTransform>,
    pub sharpen: Sharpen,
    pub stretch_contrast: bool,
    /// Full-resolution rectangles to black out.
    pub redactions: Vec<Redaction>,
    pub overlay: Option<Overlay>,
}

impl OperationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether no operation would change a raster.
    pub fn is_noop(&self) -> bool {
        self.crop.is_full()
            && self.scale.is_full()
            && self.rotate.is_noop()
            && self.transpose.is_none()
            && self.color_transform.is_none()
            && self.sharpen.is_noop()
            && !self.stretch_contrast
            && self.redactions.is_empty()
            && self.overlay.is_none()
    }
}

/// Runs operation lists under a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Processor {
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Produce the derivative of `raster`.
    ///
    /// `rf` is the reduction the decoder already applied. `renderer` is only
    /// needed for string overlays.
    ///
    /// # Errors
    ///
    /// The first error of any stage. The input raster is consumed either way,
    /// except that an overlay source failure is logged and skipped when
    /// [`ProcessorConfig::skip_failed_overlay`] is set.
    pub fn process(
        &self,
        raster: Raster,
        rf: ReductionFactor,
        ops: &OperationList,
        source: &dyn OverlaySource,
        renderer: Option<&dyn GlyphRenderer>,
    ) -> Result<Raster, TransformError> {
        let source_bounds = raster.dimensions();
        debug!(
            width = source_bounds.0,
            height = source_bounds.1,
            rf = rf.factor(),
            "Processing operation list"
        );

        let mut current = raster;

        // Geometry
        let step = owned(crop_image(&current, &ops.crop, rf)?);
        advance(&mut current, "crop", step);

        let step = owned(apply_redactions(
            &current,
            &ops.crop,
            source_bounds,
            rf,
            &ops.redactions,
        )?);
        advance(&mut current, "redact", step);

        if !ops.scale.is_full() {
            let (target_width, target_height) = ops.scale.target_size(current.dimensions(), rf)?;
            self.config.check_output_size(target_width, target_height)?;
        }
        let step = owned(scale_image(&current, &ops.scale, rf)?);
        advance(&mut current, "scale", step);

        let step = owned(rotate_image(&current, &ops.rotate)?);
        advance(&mut current, "rotate", step);

        if let Some(axis) = ops.transpose {
            let step = transpose_image(&current, axis);
            advance(&mut current, "transpose", Some(step));
        }

        // Color
        if let Some(kind) = ops.color_transform {
            let step = owned(transform_color(&current, kind));
            advance(&mut current, "color_transform", step);
        }
        if self.config.reduce_to_8_bits {
            let step = owned(reduce_to_8_bits(&current));
            advance(&mut current, "reduce_to_8_bits", step);
        }
        if let Some(background) = self.config.background_color {
            let step = owned(remove_alpha_with_background(&current, background));
            advance(&mut current, "flatten", step);
        }

        // Filters
        let step = owned(sharpen_image(&current, &ops.sharpen)?);
        advance(&mut current, "sharpen", step);

        if ops.stretch_contrast {
            let step = owned(stretch_contrast(&current));
            advance(&mut current, "stretch_contrast", step);
        }

        // Compositing
        if let Some(overlay) = &ops.overlay {
            match apply_overlay(&current, overlay, source, renderer) {
                Ok(step) => advance(&mut current, "overlay", Some(step)),
                Err(TransformError::OverlaySource(err)) if self.config.skip_failed_overlay => {
                    warn!(error = %err, "Overlay unavailable, returning raster without it");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(current)
    }
}

/// The new raster of a stage, or `None` when it returned its input.
fn owned(step: Cow<'_, Raster>) -> Option<Raster> {
    match step {
        Cow::Owned(raster) => Some(raster),
        Cow::Borrowed(_) => None,
    }
}

fn advance(current: &mut Raster, stage: &'static str, step: Option<Raster>) {
    match step {
        Some(next) => {
            debug!(
                stage,
                width = next.width(),
                height = next.height(),
                model = ?next.color_model(),
                "Stage produced a new raster"
            );
            *current = next;
        }
        None => trace!(stage, "Stage left the raster unchanged"),
    }
}
