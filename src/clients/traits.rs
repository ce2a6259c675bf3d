use async_trait::async_trait;
use thiserror::Error;

use crate::image::ImagePayload;

/// Failure to get text out of the vision backend.
///
/// Always recovered by the analyzer: any variant triggers the fallback result.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model credential configured")]
    MissingCredential,
    #[error("vision model is not configured")]
    Unavailable,
    #[error("backend rejected the credential ({status}): {message}")]
    Credential { status: u16, message: String },
    #[error("backend quota exhausted: {0}")]
    Quota(String),
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend blocked the request: {0}")]
    Blocked(String),
    #[error("backend returned no text")]
    EmptyResponse,
}

/// Vision-capable generative backend.
///
/// One implementation is chosen at startup and injected into the analyzer;
/// implementations hold no per-request state.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send the instruction and image, returning the model's raw text.
    async fn generate(&self, prompt: &str, image: &ImagePayload) -> Result<String, ModelError>;

    /// False for backends that can never answer, letting callers skip
    /// straight to the fallback without decoding the image.
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}
