//! Turns raw model text into a validated `AnalysisResult`.
//!
//! Models like to wrap JSON in markdown fences, so the fence is removed before
//! decoding. Decoding goes through `RawAnalysis`, whose optional fields are
//! then defaulted. Nested values (severity labels, confidence range) are not
//! checked here and pass through as the model wrote them; loosely typed
//! nested fields are coerced by `crate::deserializers`.

use serde::Deserialize;
use thiserror::Error;

use crate::deserializers::de_option_f64_forgiving;
use crate::schemas::{AnalysisResult, Component, Step, Warning};

pub const DEFAULT_CONFIDENCE: f64 = 0.8;
const SNIPPET_CHARS: usize = 500;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("model response is not valid analysis JSON: {message}")]
    Decode { message: String, snippet: String },
    #[error("model response is missing required field `{field}`")]
    MissingField { field: &'static str, snippet: String },
}

impl ParseError {
    /// The offending text, truncated for logs.
    pub fn snippet(&self) -> &str {
        match self {
            ParseError::Decode { snippet, .. } | ParseError::MissingField { snippet, .. } => {
                snippet
            }
        }
    }
}

/// Model output as decoded, before defaults are applied.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalysis {
    pub observations: Option<String>,
    pub components: Option<Vec<Component>>,
    pub predicted_outcome: Option<String>,
    pub safety_warnings: Option<Vec<Warning>>,
    pub guidance: Option<Vec<Step>>,
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    pub confidence_score: Option<f64>,
}

impl RawAnalysis {
    /// Fill optional fields with their defaults.
    ///
    /// `observations` and `predicted_outcome` have no sensible default and
    /// must be present.
    pub fn with_defaults(self, source: &str) -> Result<AnalysisResult, ParseError> {
        let observations = self
            .observations
            .ok_or_else(|| missing("observations", source))?;
        let predicted_outcome = self
            .predicted_outcome
            .ok_or_else(|| missing("predicted_outcome", source))?;

        Ok(AnalysisResult {
            observations,
            components: self.components.unwrap_or_default(),
            predicted_outcome,
            safety_warnings: self.safety_warnings.unwrap_or_default(),
            guidance: self.guidance.unwrap_or_default(),
            confidence_score: self.confidence_score.unwrap_or(DEFAULT_CONFIDENCE),
        })
    }
}

fn missing(field: &'static str, source: &str) -> ParseError {
    ParseError::MissingField {
        field,
        snippet: truncate_snippet(source),
    }
}

fn truncate_snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

/// Remove a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        body = &rest[tag_len..];
    }
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse raw model text into an `AnalysisResult`.
pub fn parse_analysis_response(raw: &str) -> Result<AnalysisResult, ParseError> {
    let json_str = strip_code_fence(raw);
    let parsed: RawAnalysis =
        serde_json::from_str(json_str).map_err(|e| ParseError::Decode {
            message: e.to_string(),
            snippet: truncate_snippet(json_str),
        })?;
    parsed.with_defaults(json_str)
}
