//! Public decode entry points and the error type.

use alloc::string::String;
use thiserror::Error;

use crate::limits::Limits;
use crate::vp8::{Frame, Vp8Decoder};

/// Errors that can occur while decoding a VP8 key frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodingError {
    /// The bitstream ended early or decoded inconsistently.
    #[error("Corrupt bitstream")]
    BitStreamError,

    /// VP8's `[0x9D, 0x01, 0x2A]` start code not found.
    #[error("Invalid VP8 magic: {0:x?}")]
    Vp8MagicInvalid([u8; 3]),

    /// The boolean decoder was initialized without data.
    #[error("Not enough VP8 init data")]
    NotEnoughInitData,

    /// Only the YUV color space, encoded as 0, is specified.
    #[error("Invalid VP8 color space: {0}")]
    ColorSpaceInvalid(u8),

    /// Luma prediction mode was not recognised.
    #[error("Invalid VP8 luma prediction mode: {0}")]
    LumaPredictionModeInvalid(i8),

    /// Subblock intra prediction mode was not recognised.
    #[error("Invalid VP8 intra prediction mode: {0}")]
    IntraPredictionModeInvalid(i8),

    /// Chroma prediction mode was not recognised.
    #[error("Invalid VP8 chroma prediction mode: {0}")]
    ChromaPredictionModeInvalid(i8),

    /// The stream may be valid but needs features outside the intra
    /// decoding scope (interframes).
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A parameter fell outside the configured [`Limits`].
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Plane allocation would exceed the configured memory limit.
    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,

    /// Decoding was cancelled via an [`enough::Stop`] token.
    #[error("Decoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for DecodingError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

/// Decode a VP8 key frame from raw frame data (beginning at the frame
/// tag) into planar YUV 4:2:0.
///
/// ```rust,no_run
/// let data: &[u8] = &[];
/// let frame = vp8frame::decode_frame(data)?;
/// let first_row = frame.y_row(0);
/// # Ok::<(), vp8frame::DecodingError>(())
/// ```
pub fn decode_frame(data: &[u8]) -> Result<Frame, DecodingError> {
    Vp8Decoder::decode_frame(data)
}

/// Decode a VP8 key frame under resource limits.
pub fn decode_frame_with_limits(data: &[u8], limits: Limits) -> Result<Frame, DecodingError> {
    Vp8Decoder::decode_frame_with_limits(data, limits)
}

/// Decode a VP8 key frame with cooperative cancellation. The stop token
/// is checked between macroblock rows, so a cancelled decode never
/// leaves a macroblock half reconstructed.
pub fn decode_frame_with_stop(
    data: &[u8],
    stop: &dyn enough::Stop,
) -> Result<Frame, DecodingError> {
    Vp8Decoder::decode_frame_with_stop(data, Some(stop))
}
