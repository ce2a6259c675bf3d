pub mod gemini;
pub mod null;
pub mod traits;

use std::sync::Arc;

pub use gemini::GeminiVisionClient;
pub use null::NullModel;
pub use traits::{ModelError, VisionModel};

use crate::config::Config;

/// Pick the vision backend for this process.
///
/// A configured credential selects Gemini; without one (or if the client
/// cannot be built) every analysis is served from the fallback.
pub fn create_vision_model(config: &Config) -> Arc<dyn VisionModel> {
    let Some(api_key) = config.runtime.gemini_api_key.as_deref() else {
        tracing::warn!("GEMINI_API_KEY not set; serving fallback analyses only");
        return Arc::new(NullModel);
    };

    match GeminiVisionClient::new(api_key, &config.model) {
        Ok(client) => {
            tracing::info!("Using Gemini vision model {}", client.model());
            Arc::new(client)
        }
        Err(e) => {
            tracing::warn!("Gemini client unavailable ({}); serving fallback analyses only", e);
            Arc::new(NullModel)
        }
    }
}
