//! Error types shared by every engine stage.

use thiserror::Error;

/// Errors raised while resolving an overlay source image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlaySourceError {
    /// Nothing is registered or reachable under the URI.
    #[error("Overlay image not found: {0}")]
    NotFound(String),

    /// The source was found but could not be turned into a raster.
    #[error("Overlay image {uri} could not be decoded: {reason}")]
    Decode { uri: String, reason: String },
}

/// Errors returned by engine operations.
///
/// Every operation validates its parameters before allocating, so an error
/// always leaves the caller's raster untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// An operation descriptor carries values the engine cannot honor.
    #[error("Invalid operation parameter: {0}")]
    InvalidOperationParameter(String),

    /// The overlay image could not be retrieved or decoded.
    #[error(transparent)]
    OverlaySource(#[from] OverlaySourceError),

    /// The raster uses a component layout outside the supported set.
    #[error("Unsupported color model: {0}")]
    UnsupportedColorModel(String),
}

impl TransformError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TransformError::InvalidOperationParameter(message.into())
    }
}
