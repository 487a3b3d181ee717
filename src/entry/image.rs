//! Image preprocessing boundary.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use super::recognition::RecognitionFailure;

/// Bounds applied by an [`ImagePreprocessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    /// Longest side in pixels after resizing.
    pub max_dimension: u32,
    /// Re-encoding quality, 1..=100.
    pub quality: u8,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            quality: 80,
        }
    }
}

/// Image as captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// MIME type reported by the capture source.
    pub mime: String,
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
}

/// Image ready for upload and embedding, as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    /// `data:<mime>;base64,...` form of the image.
    pub data_url: String,
}

/// Resizes and re-encodes captured images. Treated as a black box: the
/// implementation must keep the aspect ratio, cap the longer side at
/// [`ImageLimits::max_dimension`] and encode at [`ImageLimits::quality`].
pub trait ImagePreprocessor: Send + Sync {
    /// Produces an upload-ready image within `limits`.
    fn preprocess(
        &self,
        raw: RawImage,
        limits: &ImageLimits,
    ) -> Result<PreparedImage, RecognitionFailure>;
}

/// Embeds images unchanged. For callers whose capture path already produces
/// a bounded, encoded image.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughPreprocessor;

impl ImagePreprocessor for PassthroughPreprocessor {
    fn preprocess(
        &self,
        raw: RawImage,
        _limits: &ImageLimits,
    ) -> Result<PreparedImage, RecognitionFailure> {
        if raw.bytes.is_empty() {
            return Err(RecognitionFailure::Preprocess("empty image".to_string()));
        }
        if !raw.mime.starts_with("image/") {
            return Err(RecognitionFailure::Preprocess(format!(
                "unsupported content type {}",
                raw.mime
            )));
        }
        Ok(PreparedImage {
            data_url: format!("data:{};base64,{}", raw.mime, Base64::encode_string(&raw.bytes)),
        })
    }
}
