//! GeminiVisionClient and the full analyzer against a local stand-in for the
//! generateContent endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use newtons_lens::ExperimentAnalyzer;
use newtons_lens::clients::{GeminiVisionClient, ModelError, VisionModel};
use newtons_lens::config::ModelConfig;
use newtons_lens::fallback;
use newtons_lens::image::ImagePayload;
use newtons_lens::schemas::ExperimentDomain;

#[derive(Clone)]
struct Mock {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(Option<String>, String, Value)>>>,
}

async fn generate_content(
    State(mock): State<Mock>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.seen.lock().unwrap().push((key, call, body));
    (mock.status, Json(mock.reply.clone()))
}

async fn spawn_mock(status: StatusCode, reply: Value) -> (ModelConfig, Mock) {
    let mock = Mock {
        status,
        reply,
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1beta/models/:call", post(generate_content))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let settings = ModelConfig {
        name: "gemini-test".to_string(),
        api_base: format!("http://{addr}"),
        request_timeout_ms: 5_000,
    };
    (settings, mock)
}

fn text_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn sends_prompt_image_and_key() {
    let (settings, mock) = spawn_mock(StatusCode::OK, text_reply("hello from gemini")).await;
    let client = GeminiVisionClient::new("test-key", &settings).unwrap();

    let image = ImagePayload::new(b"hello".to_vec(), "image/png");
    let text = client.generate("describe this", &image).await.unwrap();
    assert_eq!(text, "hello from gemini");

    let seen = mock.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (key, call, body) = &seen[0];
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(call, "gemini-test:generateContent");

    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], "describe this");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(parts[1]["inline_data"]["data"], "aGVsbG8=");
}

#[tokio::test]
async fn quota_errors_are_classified() {
    let (settings, _mock) = spawn_mock(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}),
    )
    .await;
    let client = GeminiVisionClient::new("test-key", &settings).unwrap();
    let err = client
        .generate("p", &ImagePayload::new(vec![1, 2, 3], "image/jpeg"))
        .await
        .unwrap_err();
    match err {
        ModelError::Quota(message) => assert_eq!(message, "RESOURCE_EXHAUSTED: Quota exceeded"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn bad_key_is_a_credential_error() {
    let (settings, _mock) = spawn_mock(
        StatusCode::FORBIDDEN,
        json!({"error": {"message": "API key not valid", "status": "PERMISSION_DENIED"}}),
    )
    .await;
    let client = GeminiVisionClient::new("wrong", &settings).unwrap();
    let err = client
        .generate("p", &ImagePayload::new(vec![0], "image/jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Credential { status: 403, .. }));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let settings = ModelConfig {
        name: "gemini-test".to_string(),
        // port 9 (discard) is not listening on loopback
        api_base: "http://127.0.0.1:9".to_string(),
        request_timeout_ms: 2_000,
    };
    let client = GeminiVisionClient::new("k", &settings).unwrap();
    let err = client
        .generate("p", &ImagePayload::new(vec![0], "image/jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::Transport(_) | ModelError::Timeout { .. }
    ));
}

#[tokio::test]
async fn analyzer_parses_fenced_model_output() {
    let reply = r#"```json
{
  "observations": "A breadboard with one LED and a 220 ohm resistor.",
  "components": [
    {"type": "LED", "properties": {"color": "green"}, "position": "row 10", "connections": ["resistor"]},
    {"type": "Resistor", "properties": {"resistance": "220 ohm"}}
  ],
  "predicted_outcome": "The LED lights at moderate brightness.",
  "safety_warnings": [],
  "guidance": [{"step": 1, "instruction": "Connect the battery."}],
  "confidence_score": 0.92
}
```"#;
    let (settings, _mock) = spawn_mock(StatusCode::OK, text_reply(reply)).await;
    let analyzer = ExperimentAnalyzer::new(Arc::new(
        GeminiVisionClient::new("test-key", &settings).unwrap(),
    ));

    let result = analyzer
        .analyze("data:image/jpeg;base64,/9j/4AAQ", "circuits")
        .await;
    assert_eq!(result.confidence_score, 0.92);
    assert_eq!(result.components.len(), 2);
    assert_eq!(result.components[1].component_type, "Resistor");
    assert!(result.components[1].connections.is_empty());
    assert_eq!(result.guidance[0].instruction, "Connect the battery.");
}

#[tokio::test]
async fn analyzer_falls_back_on_backend_failure() {
    let (settings, _mock) = spawn_mock(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": {"message": "internal", "status": "INTERNAL"}}),
    )
    .await;
    let analyzer = ExperimentAnalyzer::new(Arc::new(
        GeminiVisionClient::new("test-key", &settings).unwrap(),
    ));
    let result = analyzer
        .analyze("data:image/jpeg;base64,/9j/4AAQ", "physics")
        .await;
    assert_eq!(result, fallback::generate(ExperimentDomain::Physics));
}

#[tokio::test]
async fn blocked_prompt_falls_back() {
    let (settings, _mock) = spawn_mock(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    )
    .await;
    let client = GeminiVisionClient::new("test-key", &settings).unwrap();
    let err = client
        .generate("p", &ImagePayload::new(vec![0], "image/jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Blocked(ref reason) if reason == "SAFETY"));
}
