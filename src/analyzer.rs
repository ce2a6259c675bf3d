//! Analysis orchestration: prompt, model call, parse, and the fallback
//! guarantee. `ExperimentAnalyzer::analyze` never fails.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::clients::{ModelError, VisionModel};
use crate::fallback;
use crate::image::{ImageDecodeError, decode_image_data};
use crate::parser::{ParseError, parse_analysis_response};
use crate::prompts::build_analysis_prompt;
use crate::schemas::{AnalysisResult, ExperimentDomain};

/// Why the model path was abandoned.
#[derive(Debug, Error)]
pub enum PipelineFailure {
    #[error("image decode failed: {0}")]
    Image(#[from] ImageDecodeError),
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("response parse failed: {0}")]
    Parse(#[from] ParseError),
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisSource {
    Model,
    /// No model configured.
    FallbackOnly,
    /// The model path failed; carries the reason.
    Fallback(String),
}

impl fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisSource::Model => f.write_str("model"),
            AnalysisSource::FallbackOnly => f.write_str("fallback (no model configured)"),
            AnalysisSource::Fallback(reason) => write!(f, "fallback ({reason})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub source: AnalysisSource,
}

/// Stateless orchestrator over an injected vision model.
#[derive(Clone)]
pub struct ExperimentAnalyzer {
    model: Arc<dyn VisionModel>,
}

impl ExperimentAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Analyze `image_data` for `experiment_type`, always producing a result.
    pub async fn analyze(&self, image_data: &str, experiment_type: &str) -> AnalysisResult {
        self.analyze_with_source(image_data, experiment_type)
            .await
            .result
    }

    /// Same as [`analyze`](Self::analyze) but also reports which path answered.
    pub async fn analyze_with_source(&self, image_data: &str, experiment_type: &str) -> Analysis {
        let domain = ExperimentDomain::from_label(experiment_type);

        if !self.model.is_available() {
            debug!("No vision model configured; using fallback for {}", domain);
            return Analysis {
                result: fallback::generate(domain),
                source: AnalysisSource::FallbackOnly,
            };
        }

        match self.run_model(image_data, domain).await {
            Ok(result) => {
                let problems = result.validate();
                if !problems.is_empty() {
                    warn!(
                        "Model analysis for {} has {} contract issue(s): {}",
                        domain,
                        problems.len(),
                        problems.join("; ")
                    );
                }
                Analysis {
                    result,
                    source: AnalysisSource::Model,
                }
            }
            Err(failure) => {
                if let PipelineFailure::Parse(ref err) = failure {
                    debug!("Unparsable model response: {}", err.snippet());
                }
                warn!("Analysis via {} failed, using fallback: {}", self.model.name(), failure);
                Analysis {
                    result: fallback::generate(domain),
                    source: AnalysisSource::Fallback(failure.to_string()),
                }
            }
        }
    }

    async fn run_model(
        &self,
        image_data: &str,
        domain: ExperimentDomain,
    ) -> Result<AnalysisResult, PipelineFailure> {
        let image = decode_image_data(image_data)?;
        let prompt = build_analysis_prompt(domain);
        let raw = self.model.generate(&prompt, &image).await?;
        Ok(parse_analysis_response(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::NullModel;
    use crate::image::ImagePayload;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed reply and records what it was sent.
    struct ScriptedModel {
        reply: Result<String, fn() -> ModelError>,
        seen: Mutex<Vec<(String, ImagePayload)>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: fn() -> ModelError) -> Self {
            Self {
                reply: Err(err),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn generate(&self, prompt: &str, image: &ImagePayload) -> Result<String, ModelError> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.to_string(), image.clone()));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    const IMAGE: &str = "data:image/png;base64,aGVsbG8=";

    #[tokio::test]
    async fn null_model_skips_decoding() {
        let analyzer = ExperimentAnalyzer::new(Arc::new(NullModel));
        let analysis = analyzer.analyze_with_source("anything", "circuits").await;
        assert_eq!(analysis.source, AnalysisSource::FallbackOnly);
        assert_eq!(analysis.result, fallback::generate(ExperimentDomain::Circuits));
    }

    #[tokio::test]
    async fn model_receives_domain_prompt_and_decoded_image() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"observations": "o", "components": [], "predicted_outcome": "p"}"#,
        ));
        let analyzer = ExperimentAnalyzer::new(model.clone());
        let analysis = analyzer.analyze_with_source(IMAGE, "physics").await;

        assert_eq!(analysis.source, AnalysisSource::Model);
        assert_eq!(analysis.result.observations, "o");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, build_analysis_prompt(ExperimentDomain::Physics));
        assert_eq!(seen[0].1, ImagePayload::new(b"hello".to_vec(), "image/png"));
    }

    #[tokio::test]
    async fn bad_image_falls_back_without_calling_model() {
        let model = Arc::new(ScriptedModel::replying("{}"));
        let analyzer = ExperimentAnalyzer::new(model.clone());
        let analysis = analyzer.analyze_with_source("%%%", "chemistry").await;

        assert!(matches!(analysis.source, AnalysisSource::Fallback(_)));
        assert_eq!(analysis.result, fallback::generate(ExperimentDomain::Chemistry));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_error_falls_back() {
        let analyzer = ExperimentAnalyzer::new(Arc::new(ScriptedModel::failing(|| {
            ModelError::Quota("daily limit".to_string())
        })));
        let result = analyzer.analyze(IMAGE, "chemistry").await;
        assert_eq!(result.confidence_score, 0.75);
        assert_eq!(result.guidance.len(), 5);
    }

    #[tokio::test]
    async fn unparsable_reply_falls_back() {
        let analyzer =
            ExperimentAnalyzer::new(Arc::new(ScriptedModel::replying("Looks like a ramp!")));
        let result = analyzer.analyze(IMAGE, "physics").await;
        assert_eq!(result, fallback::generate(ExperimentDomain::Physics));
    }

    #[tokio::test]
    async fn unknown_label_general_prompt_but_circuits_fallback() {
        let model = Arc::new(ScriptedModel::replying("not json"));
        let analyzer = ExperimentAnalyzer::new(model.clone());
        let result = analyzer.analyze(IMAGE, "astronomy").await;

        assert_eq!(result, fallback::generate(ExperimentDomain::Circuits));
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].0, build_analysis_prompt(ExperimentDomain::General));
    }
}
