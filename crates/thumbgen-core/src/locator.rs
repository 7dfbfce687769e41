use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Container extension assumed for every video.
pub const CONTAINER_EXTENSION: &str = "mp4";

/// Seek target used when none is configured. Lands just after the first
/// timestamp instead of exactly on the initial keyframe, which some decoders
/// report as a black frame.
pub const DEFAULT_SEEK_OFFSET_SECS: f64 = 0.1;

/// Where a video lives and which instant of it to grab, rendered as
/// `<origin>/<id>.mp4#t=<offset>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLocator {
    origin: String,
    id: String,
    offset_secs: f64,
}

impl ResourceLocator {
    pub fn new(origin: &str, id: &str, offset_secs: f64) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            id: id.to_string(),
            offset_secs,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seek_offset(&self) -> f64 {
        self.offset_secs
    }

    /// The locator without its `#t=` fragment, i.e. what a demuxer opens.
    pub fn media_url(&self) -> String {
        format!("{}/{}.{}", self.origin, self.id, CONTAINER_EXTENSION)
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#t={}", self.media_url(), self.offset_secs)
    }
}

impl FromStr for ResourceLocator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidLocator(s.to_string());

        let (url, fragment) = s.rsplit_once('#').ok_or_else(invalid)?;
        let offset_secs: f64 = fragment
            .strip_prefix("t=")
            .and_then(|t| t.parse().ok())
            .ok_or_else(invalid)?;
        let stem = url
            .strip_suffix(CONTAINER_EXTENSION)
            .and_then(|u| u.strip_suffix('.'))
            .ok_or_else(invalid)?;
        let (origin, id) = stem.rsplit_once('/').ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(origin, id, offset_secs))
    }
}
