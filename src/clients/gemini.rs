//! Gemini `generateContent` client for image + text prompts.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::traits::{ModelError, VisionModel};
use crate::config::ModelConfig;
use crate::image::ImagePayload;

const ERROR_BODY_CAP_CHARS: usize = 500;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Vision model backed by the Gemini REST API.
#[derive(Clone, Debug)]
pub struct GeminiVisionClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout_ms: u64,
}

impl GeminiVisionClient {
    /// Build a client for `settings`. Fails when the credential is blank.
    pub fn new(api_key: impl Into<String>, settings: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::MissingCredential);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| ModelError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.api_base.trim_end_matches('/'),
            settings.name
        );

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            model: settings.name.clone(),
            endpoint,
            timeout_ms: settings.request_timeout_ms,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            ModelError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl VisionModel for GeminiVisionClient {
    async fn generate(&self, prompt: &str, image: &ImagePayload) -> Result<String, ModelError> {
        debug!(
            "Calling Gemini (model={}, prompt_chars={}, image_bytes={}, mime={})",
            self.model,
            prompt.len(),
            image.bytes.len(),
            image.mime_type
        );

        let body = GenerateRequest {
            contents: [RequestContent {
                role: "user",
                parts: [
                    RequestPart::Text { text: prompt },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(classify_http_error(status.as_u16(), &body_text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.map_send_error(e))?;
        extract_text(parsed)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn classify_http_error(status: u16, body: &str) -> ModelError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) if !envelope.error.message.is_empty() => {
                format!("{}: {}", code, envelope.error.message)
            }
            Some(code) => code,
            None => envelope.error.message,
        },
        Err(_) => body.chars().take(ERROR_BODY_CAP_CHARS).collect(),
    };

    match status {
        401 | 403 => ModelError::Credential { status, message },
        429 => ModelError::Quota(message),
        _ => ModelError::Backend { status, message },
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, ModelError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(ModelError::Blocked(reason));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ModelError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_default();
        if matches!(reason.as_str(), "SAFETY" | "RECITATION" | "BLOCKLIST") {
            return Err(ModelError::Blocked(reason));
        }
        return Err(ModelError::EmptyResponse);
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ModelConfig {
        ModelConfig::default()
    }

    #[test]
    fn blank_credential_is_rejected() {
        assert!(matches!(
            GeminiVisionClient::new("  ", &settings()),
            Err(ModelError::MissingCredential)
        ));
    }

    #[test]
    fn endpoint_includes_model_name() {
        let mut cfg = settings();
        cfg.api_base = "http://127.0.0.1:9/".to_string();
        cfg.name = "gemini-test".to_string();
        let client = GeminiVisionClient::new("key", &cfg).unwrap();
        assert_eq!(
            client.endpoint,
            "http://127.0.0.1:9/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn request_body_matches_wire_format() {
        let body = GenerateRequest {
            contents: [RequestContent {
                role: "user",
                parts: [
                    RequestPart::Text { text: "look" },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: "AAEC".to_string(),
                        },
                    },
                ],
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "look");
        assert_eq!(
            value["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(value["contents"][0]["parts"][1]["inline_data"]["data"], "AAEC");
    }

    #[test]
    fn http_errors_are_classified() {
        let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_http_error(429, quota),
            ModelError::Quota(msg) if msg == "RESOURCE_EXHAUSTED: Quota exceeded"
        ));
        assert!(matches!(
            classify_http_error(403, "{}"),
            ModelError::Credential { status: 403, .. }
        ));
        assert!(matches!(
            classify_http_error(500, "upstream exploded"),
            ModelError::Backend { status: 500, message } if message == "upstream exploded"
        ));
    }

    #[test]
    fn text_parts_are_joined() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn blocked_and_empty_responses_fail() {
        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(matches!(extract_text(blocked), Err(ModelError::Blocked(_))));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_text(empty), Err(ModelError::EmptyResponse)));

        let filtered: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(matches!(extract_text(filtered), Err(ModelError::Blocked(r)) if r == "SAFETY"));
    }
}
