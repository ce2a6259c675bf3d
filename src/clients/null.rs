use async_trait::async_trait;

use crate::clients::traits::{ModelError, VisionModel};
use crate::image::ImagePayload;

/// Stand-in used when no credential is configured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullModel;

#[async_trait]
impl VisionModel for NullModel {
    async fn generate(&self, _prompt: &str, _image: &ImagePayload) -> Result<String, ModelError> {
        Err(ModelError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "null"
    }
}
