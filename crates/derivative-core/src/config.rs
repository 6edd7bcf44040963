//! Processor configuration.

use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::raster::Color;

/// Default output size limit (100 megapixels).
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// Settings applied by [`Processor`](crate::Processor) on top of each
/// operation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Largest output a scale may produce, in pixels.
    pub max_output_pixels: u64,
    /// Flatten alpha onto this color in the color stage.
    pub background_color: Option<Color>,
    /// Narrow 16-bit rasters to 8 bits in the color stage.
    pub reduce_to_8_bits: bool,
    /// Return the raster without its overlay when the overlay image cannot
    /// be fetched, instead of failing the whole request.
    pub skip_failed_overlay: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
            background_color: None,
            reduce_to_8_bits: false,
            skip_failed_overlay: false,
        }
    }
}

impl ProcessorConfig {
    /// Reject output sizes above `max_output_pixels`.
    pub(crate) fn check_output_size(&self, width: u32, height: u32) -> Result<(), TransformError> {
        let pixels = width as u64 * height as u64;
        if pixels > self.max_output_pixels {
            return Err(TransformError::invalid(format!(
                "output of {width}x{height} exceeds the limit of {} pixels",
                self.max_output_pixels
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.max_output_pixels, 100_000_000);
        assert_eq!(config.background_color, None);
        assert!(!config.reduce_to_8_bits);
        assert!(!config.skip_failed_overlay);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProcessorConfig =
            serde_json::from_str(r##"{"background_color": "#ffffff"}"##).unwrap();
        assert_eq!(config.background_color, Some(Color::WHITE));
        assert_eq!(config.max_output_pixels, DEFAULT_MAX_OUTPUT_PIXELS);
    }

    #[test]
    fn test_output_size_limit() {
        let config = ProcessorConfig {
            max_output_pixels: 100,
            ..Default::default()
        };
        assert!(config.check_output_size(10, 10).is_ok());
        assert!(matches!(
            config.check_output_size(11, 10),
            Err(TransformError::InvalidOperationParameter(_))
        ));
    }
}
