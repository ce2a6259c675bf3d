//! Inbound image payload decoding.
//!
//! Clients send base64 text, optionally as a data URL
//! (`data:image/png;base64,....`). The metadata is only used to pick a MIME
//! type; the payload is decoded with the standard alphabet.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Standard base64 of the raw bytes, as sent inline to the model.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Wrap the payload back into a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageDecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("data URL has no ',' separating metadata from payload")]
    MalformedDataUrl,
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
}

/// Decode `image_data`, stripping an optional data-URL prefix first.
pub fn decode_image_data(image_data: &str) -> Result<ImagePayload, ImageDecodeError> {
    let trimmed = image_data.trim();
    let (mime_type, payload) = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or(ImageDecodeError::MalformedDataUrl)?;
            (mime_from_metadata(meta), payload)
        }
        None => (DEFAULT_MIME_TYPE.to_string(), trimmed),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ImageDecodeError::Empty);
    }

    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| ImageDecodeError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }

    Ok(ImagePayload { bytes, mime_type })
}

// "image/png;base64" -> "image/png"; anything that isn't an image type falls
// back to jpeg, which is what the model endpoint expects for camera captures.
fn mime_from_metadata(meta: &str) -> String {
    let mime = meta.split(';').next().unwrap_or("").trim();
    if mime.starts_with("image/") && mime.len() > "image/".len() {
        mime.to_ascii_lowercase()
    } else {
        DEFAULT_MIME_TYPE.to_string()
    }
}

/// Guess a MIME type from a file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => DEFAULT_MIME_TYPE,
    }
}
