use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

use crate::error::{MediaError, Result};

/// Quality used when none is configured, matching what browsers pick for
/// `image/jpeg` canvas exports.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Encode tightly packed RGB24 pixels as a baseline JPEG.
pub fn encode_rgb(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 3;
    if width == 0 || height == 0 || data.len() != expected {
        return Err(MediaError::EncoderError(format!(
            "{} bytes do not describe a {width}x{height} RGB image",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(expected / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(data, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| MediaError::EncoderError(e.to_string()))?;
    Ok(out)
}
