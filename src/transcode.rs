//! Page transcoder.
//!
//! Every image entry is decoded, bounded to the page frame and re-encoded as
//! baseline JPEG, so all artifacts of an archive share one format regardless of
//! what the archive author used.
//!
//! # Design Decisions
//!
//! - **Downscale only**: pages larger than the frame are shrunk preserving
//!   aspect ratio; smaller pages keep their native size.
//!
//! - **Alpha dropped**: JPEG has no alpha channel, so images are flattened to
//!   RGB before encoding.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;

use crate::error::TranscodeError;

/// Maximum page width in pixels.
pub const MAX_PAGE_WIDTH: u32 = 1200;

/// Maximum page height in pixels.
pub const MAX_PAGE_HEIGHT: u32 = 1600;

/// JPEG quality for page artifacts (1-100).
pub const PAGE_QUALITY: u8 = 80;

/// File extension of page artifacts.
pub const PAGE_EXTENSION: &str = "jpg";

/// MIME type of page artifacts.
pub const PAGE_CONTENT_TYPE: &str = "image/jpeg";

/// A transcoded page.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    /// Encoded JPEG bytes
    pub data: Bytes,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

// =============================================================================
// Page Encoder
// =============================================================================

/// Decodes raster images and re-encodes them as bounded JPEG pages.
#[derive(Debug, Clone)]
pub struct PageEncoder {
    max_width: u32,
    max_height: u32,
    quality: u8,
}

impl Default for PageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PageEncoder {
    /// Encoder with the standard page frame and quality.
    pub fn new() -> Self {
        Self {
            max_width: MAX_PAGE_WIDTH,
            max_height: MAX_PAGE_HEIGHT,
            quality: PAGE_QUALITY,
        }
    }

    /// Encoder with a custom frame. Zero dimensions are raised to 1.
    pub fn with_frame(max_width: u32, max_height: u32, quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    /// Decode `source` (format detected from content) and re-encode it.
    ///
    /// # Errors
    ///
    /// - [`TranscodeError::BadImage`] if the bytes are not a decodable image
    /// - [`TranscodeError::EncodeFailed`] if JPEG encoding fails
    pub fn transcode(&self, source: &[u8]) -> Result<EncodedPage, TranscodeError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| TranscodeError::BadImage {
                message: e.to_string(),
            })?;

        let img = reader.decode().map_err(|e| TranscodeError::BadImage {
            message: e.to_string(),
        })?;

        let (width, height) =
            fit_within(img.width(), img.height(), self.max_width, self.max_height);
        let img = if (width, height) != (img.width(), img.height()) {
            img.resize_exact(width, height, FilterType::Lanczos3)
        } else {
            img
        };
        let rgb = img.to_rgb8();

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, self.quality)
            .encode_image(&rgb)
            .map_err(|e| TranscodeError::EncodeFailed {
                message: e.to_string(),
            })?;

        Ok(EncodedPage {
            data: Bytes::from(output),
            width,
            height,
        })
    }
}

/// Largest size with the same aspect ratio that fits inside
/// `max_width` x `max_height`. Images already inside the frame are unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let scaled = |dim: u32, max: u32| ((dim as f64 * scale).round() as u32).clamp(1, max);

    (scaled(width, max_width), scaled(height, max_height))
}
