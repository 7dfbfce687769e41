//! First-frame capture.
//!
//! A capture walks `Idle → MetadataLoaded → Seeking → FrameReady`. Media that
//! never loads, or a seek that never lands on a frame, leaves the capture
//! pending forever unless a signal timeout is configured, in which case it
//! ends in `Failed`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use thumbgen_core::locator::{DEFAULT_SEEK_OFFSET_SECS, ResourceLocator};
use thumbgen_core::task::FrameResult;

use crate::decoder::{VideoDecoder, VideoFrame};
use crate::error::CaptureError;
use crate::jpeg::{self, DEFAULT_JPEG_QUALITY};
use crate::surface::{RasterSurface, Stage, SurfaceKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    Idle,
    MetadataLoaded { width: u32, height: u32 },
    Seeking,
    FrameReady,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub seek_offset_secs: f64,
    pub jpeg_quality: u8,
    /// Upper bound on waiting for the media to load and seek. `None` waits
    /// forever.
    pub signal_timeout: Option<Duration>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            seek_offset_secs: DEFAULT_SEEK_OFFSET_SECS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            signal_timeout: None,
        }
    }
}

/// Anything that can turn a video id into its encoded first frame.
#[async_trait]
pub trait CaptureFirstFrame: Send + Sync {
    async fn capture_first_frame(&self, id: &str) -> Result<FrameResult, CaptureError>;
}

/// Captures the first frame of `<origin>/<id>.mp4` with decoder `D`.
pub struct FrameCapturer<D> {
    origin: String,
    options: CaptureOptions,
    stage: Stage,
    _decoder: PhantomData<fn() -> D>,
}

impl<D: VideoDecoder + 'static> FrameCapturer<D> {
    pub fn new(origin: impl Into<String>, stage: Stage) -> Self {
        Self {
            origin: origin.into(),
            options: CaptureOptions::default(),
            stage,
            _decoder: PhantomData,
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn locator(&self, id: &str) -> ResourceLocator {
        ResourceLocator::new(&self.origin, id, self.options.seek_offset_secs)
    }

    /// Capture and report every state transition on `state`.
    pub async fn capture_with_state(
        &self,
        id: &str,
        state: Arc<watch::Sender<CaptureState>>,
    ) -> Result<FrameResult, CaptureError> {
        let Some(limit) = self.options.signal_timeout else {
            return self.run(id, state).await;
        };

        match tokio::time::timeout(limit, self.run(id, state.clone())).await {
            Ok(result) => result,
            Err(_) => {
                let last = state.send_replace(CaptureState::Failed);
                warn!(id, ?last, ?limit, "capture timed out");
                Err(CaptureError::TimedOut {
                    id: id.to_string(),
                    state: last,
                })
            }
        }
    }

    async fn run(
        &self,
        id: &str,
        state: Arc<watch::Sender<CaptureState>>,
    ) -> Result<FrameResult, CaptureError> {
        let locator = self.locator(id);
        // Both surfaces are detached when this future completes or is dropped.
        let _decode_surface = self.stage.attach(SurfaceKind::Decode);
        let mut raster = RasterSurface::attach(&self.stage);
        debug!(%locator, "capturing first frame");

        let url = locator.media_url();
        let opened = tokio::task::spawn_blocking(move || D::open(&url))
            .await
            .map_err(|e| aborted(id, e))?;
        let mut decoder = match opened {
            Ok(decoder) => decoder,
            Err(e) => {
                debug!(%locator, error = %e, "media never loaded, capture stays pending");
                return std::future::pending().await;
            }
        };

        let info = decoder.stream_info();
        state.send_replace(CaptureState::MetadataLoaded {
            width: info.width,
            height: info.height,
        });
        debug!(id, width = info.width, height = info.height, codec = %info.codec_name, "metadata loaded");
        raster
            .resize(info.width, info.height)
            .map_err(|reason| CaptureError::RasterUnavailable {
                id: id.to_string(),
                reason,
            })?;

        state.send_replace(CaptureState::Seeking);
        let target = locator.seek_offset();
        let slack = 0.5 / info.fps.max(1.0);
        let seeked = tokio::task::spawn_blocking(move || seek_to_frame(&mut decoder, target, slack))
            .await
            .map_err(|e| aborted(id, e))?;
        let Some(frame) = seeked else {
            debug!(%locator, "seek never completed, capture stays pending");
            return std::future::pending().await;
        };

        state.send_replace(CaptureState::FrameReady);
        debug!(id, pts = frame.pts_secs, "frame ready");

        raster
            .draw(frame.width, frame.height, &frame.data)
            .map_err(|reason| CaptureError::Draw {
                id: id.to_string(),
                reason,
            })?;
        let payload = jpeg::encode_rgb(
            raster.pixels(),
            raster.width(),
            raster.height(),
            self.options.jpeg_quality,
        )
        .map_err(|source| CaptureError::Encode {
            id: id.to_string(),
            source,
        })?;

        FrameResult::new(id, payload).map_err(|source| CaptureError::Frame {
            id: id.to_string(),
            source,
        })
    }
}

#[async_trait]
impl<D: VideoDecoder + 'static> CaptureFirstFrame for FrameCapturer<D> {
    async fn capture_first_frame(&self, id: &str) -> Result<FrameResult, CaptureError> {
        let (state, _) = watch::channel(CaptureState::Idle);
        self.capture_with_state(id, Arc::new(state)).await
    }
}

/// Seek to `target` and decode forward to the first frame at or after it.
/// Falls back to the last decodable frame when the stream ends first.
/// `None` means the seek never produced a frame.
fn seek_to_frame<D: VideoDecoder>(decoder: &mut D, target: f64, slack: f64) -> Option<VideoFrame> {
    if let Err(e) = decoder.seek_to(target) {
        debug!(error = %e, "seek failed");
        return None;
    }

    let mut last = None;
    loop {
        match decoder.decode_next_frame() {
            Ok(Some(frame)) if frame.pts_secs + slack >= target => return Some(frame),
            Ok(Some(frame)) => last = Some(frame),
            Ok(None) => return last,
            Err(e) => {
                debug!(error = %e, "decode failed after seek");
                return None;
            }
        }
    }
}

fn aborted(id: &str, e: tokio::task::JoinError) -> CaptureError {
    CaptureError::Aborted {
        id: id.to_string(),
        reason: e.to_string(),
    }
}
