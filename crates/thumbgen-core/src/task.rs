use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// A video that is still waiting for a thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoTask {
    pub id: String,
}

impl VideoTask {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyVideoId);
        }
        Ok(Self { id })
    }
}

impl fmt::Display for VideoTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// The JPEG-encoded first frame of a video.
///
/// Can only be built from a non-empty buffer that starts with the JPEG SOI
/// marker. The payload is moved, never cloned, when the frame crosses the
/// bridge.
#[derive(PartialEq, Eq)]
pub struct FrameResult {
    id: String,
    payload: Vec<u8>,
}

impl FrameResult {
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Result<Self> {
        let id = id.into();
        if payload.is_empty() {
            return Err(CoreError::EmptyPayload { id });
        }
        if !payload.starts_with(&JPEG_SOI) {
            return Err(CoreError::NotJpeg { id });
        }
        Ok(Self { id, payload })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Split into the id and the owned payload.
    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.id, self.payload)
    }
}

impl fmt::Debug for FrameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameResult")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// A user-facing notification relayed from the worker. The pipeline never
/// interprets its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub message: String,
    pub category: String,
    pub duration: Option<Duration>,
}

impl Toast {
    pub fn new(message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: category.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_task_rejects_empty_id() {
        assert!(matches!(VideoTask::new(""), Err(CoreError::EmptyVideoId)));
        assert_eq!(VideoTask::new("abc123").unwrap().to_string(), "abc123");
    }

    #[test]
    fn test_frame_result_requires_jpeg() {
        assert!(matches!(
            FrameResult::new("a", Vec::new()),
            Err(CoreError::EmptyPayload { .. })
        ));
        assert!(matches!(
            FrameResult::new("a", vec![0x89, 0x50, 0x4E, 0x47]),
            Err(CoreError::NotJpeg { .. })
        ));

        let frame = FrameResult::new("a", vec![0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        assert_eq!(frame.id(), "a");
        let (id, payload) = frame.into_parts();
        assert_eq!(id, "a");
        assert_eq!(payload.len(), 4);
    }
}
