//! HTTP transport module for newtons-lens
//!
//! Axum router exposing the analysis pipeline and stored sessions. Rate limits
//! are per client IP; /health is exempt.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analyzer::ExperimentAnalyzer;
use crate::config::{Config, ServerConfig};
use crate::error::{LensError, Result};
use crate::sessions::SessionStore;

const ANALYZE_PATH: &str = "/api/analyze";
const NO_IMAGE: &str = "No image data provided";
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub analyzer: ExperimentAnalyzer,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(analyzer: ExperimentAnalyzer, store: Arc<dyn SessionStore>) -> Self {
        Self { analyzer, store }
    }
}

/// Per-client request quotas
pub struct RateLimits {
    analyze: DefaultKeyedRateLimiter<IpAddr>,
    general: DefaultKeyedRateLimiter<IpAddr>,
}

impl RateLimits {
    pub fn new(analyze_per_minute: u32, requests_per_hour: u32) -> Self {
        let per_minute = NonZeroU32::new(analyze_per_minute).unwrap_or(NonZeroU32::MIN);
        let per_hour = NonZeroU32::new(requests_per_hour).unwrap_or(NonZeroU32::MIN);
        Self::with_quotas(Quota::per_minute(per_minute), Quota::per_hour(per_hour))
    }

    pub fn with_quotas(analyze: Quota, general: Quota) -> Self {
        Self {
            analyze: RateLimiter::keyed(analyze),
            general: RateLimiter::keyed(general),
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(server.analyze_per_minute, server.requests_per_hour)
    }

    /// True when the request may proceed.
    pub fn check(&self, path: &str, client: IpAddr) -> bool {
        if path == "/health" {
            return true;
        }
        let limiter = if path == ANALYZE_PATH {
            &self.analyze
        } else {
            &self.general
        };
        limiter.check_key(&client).is_ok()
    }

    /// Forget clients whose quota has fully replenished.
    pub fn prune(&self) {
        self.analyze.retain_recent();
        self.general.retain_recent();
        self.analyze.shrink_to_fit();
        self.general.shrink_to_fit();
    }

    /// Number of per-client entries currently held across both limiters.
    pub fn tracked_clients(&self) -> usize {
        self.analyze.len() + self.general.len()
    }
}

/// Periodically prune `limits` so idle client entries do not accumulate.
pub fn spawn_limit_pruner(limits: Arc<RateLimits>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limits.prune();
            tracing::debug!(
                "Rate limiter pruned; {} client entries remain",
                limits.tracked_clients()
            );
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image_data: Option<String>,
    /// Non-string values are treated as absent.
    #[serde(default)]
    pub experiment_type: Option<Value>,
    /// Opaque; strings are kept as-is, other JSON values are stringified.
    #[serde(default)]
    pub experiment_id: Option<Value>,
}

impl AnalyzeRequest {
    fn experiment_type(&self) -> &str {
        match &self.experiment_type {
            Some(Value::String(label)) => label,
            _ => "general",
        }
    }

    fn experiment_id(&self) -> Option<String> {
        match &self.experiment_id {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Error body returned to clients: `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Log the underlying error and hide it behind a generic message.
    fn internal(public_message: &str, err: LensError) -> Self {
        tracing::error!("{}: {}", public_message, err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, public_message)
    }
}

impl From<LensError> for ApiError {
    fn from(err: LensError) -> Self {
        match err {
            LensError::Input { message } => Self::new(StatusCode::BAD_REQUEST, message),
            other => Self::internal("Internal server error", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Analyze an uploaded image and record the session
pub async fn analyze_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ));
        }
        Err(rejection) => {
            tracing::debug!("Rejected analyze body: {}", rejection);
            return Err(LensError::input(NO_IMAGE).into());
        }
    };
    let Some(image_data) = request
        .image_data
        .as_deref()
        .filter(|data| !data.trim().is_empty())
    else {
        return Err(LensError::input(NO_IMAGE).into());
    };

    let experiment_type = request.experiment_type();
    let experiment_id = request.experiment_id();

    let analysis = state
        .analyzer
        .analyze_with_source(image_data, experiment_type)
        .await;
    tracing::info!(
        "Analyzed {} experiment via {}",
        experiment_type,
        analysis.source
    );
    let result = analysis.result;

    let session_id = state
        .store
        .create_session(experiment_id.as_deref(), image_data, &result)
        .await
        .map_err(|e| ApiError::internal("Failed to record analysis session", e))?;

    for component in &result.components {
        state
            .store
            .create_component(&session_id, component)
            .await
            .map_err(|e| ApiError::internal("Failed to record analysis session", e))?;
    }

    Ok(Json(json!({
        "session_id": session_id,
        "status": "completed",
        "analysis": result,
    })))
}

/// Fetch a stored session
pub async fn session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    let session = state
        .store
        .get_session(&session_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load session", e))?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Session not found"))?;

    let body = serde_json::to_value(&session)
        .map_err(|e| ApiError::internal("Failed to load session", e.into()))?;
    Ok(Json(body))
}

/// List the components stored for a session
pub async fn session_components_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    let exists = state
        .store
        .get_session(&session_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load session", e))?
        .is_some();
    if !exists {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Session not found"));
    }

    let components = state
        .store
        .list_components(&session_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load session", e))?;
    Ok(Json(json!({
        "session_id": session_id,
        "components": components,
    })))
}

async fn rate_limit(
    State(limits): State<Arc<RateLimits>>,
    req: Request,
    next: Next,
) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !limits.check(req.uri().path(), client) {
        tracing::debug!("Rate limit hit for {} on {}", client, req.uri().path());
        return ApiError::new(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
    }
    next.run(req).await
}

/// Build the application router
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    router_with_limits(state, server, Arc::new(RateLimits::from_config(server)))
}

/// Build the router around an existing set of rate limiters.
pub fn router_with_limits(state: AppState, server: &ServerConfig, limits: Arc<RateLimits>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(ANALYZE_PATH, post(analyze_handler))
        .route("/api/sessions/:session_id", get(session_handler))
        .route(
            "/api/sessions/:session_id/components",
            get(session_components_handler),
        )
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(middleware::from_fn_with_state(limits, rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_http_server(config: &Config, state: AppState) -> Result<()> {
    let limits = Arc::new(RateLimits::from_config(&config.server));
    spawn_limit_pruner(Arc::clone(&limits), LIMITER_PRUNE_INTERVAL);
    let app = router_with_limits(state, &config.server, limits);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!("Starting HTTP server on {}", config.server.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
