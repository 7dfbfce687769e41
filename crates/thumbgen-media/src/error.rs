use thiserror::Error;

use crate::capture::CaptureState;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open media: {0}")]
    OpenFailed(String),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("decoder error: {0}")]
    DecoderError(String),

    #[error("seek error: {0}")]
    SeekError(String),

    #[error("encoder error: {0}")]
    EncoderError(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// Failures of a single first-frame capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("raster surface unavailable for {id}: {reason}")]
    RasterUnavailable { id: String, reason: String },

    #[error("failed to draw frame of {id}: {reason}")]
    Draw { id: String, reason: String },

    #[error("failed to encode frame of {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: MediaError,
    },

    #[error("encoded frame of {id} rejected: {source}")]
    Frame {
        id: String,
        #[source]
        source: thumbgen_core::error::CoreError,
    },

    #[error("capture of {id} timed out in state {state:?}")]
    TimedOut { id: String, state: CaptureState },

    #[error("capture of {id} aborted: {reason}")]
    Aborted { id: String, reason: String },
}

impl CaptureError {
    /// Fatal errors point at the host rather than the video and stop the
    /// whole pipeline.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::TimedOut { .. } | CaptureError::Aborted { .. })
    }
}
