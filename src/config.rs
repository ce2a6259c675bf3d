use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration structure loaded from newtons_lens.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Vision model backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-1.5-pro".to_string(),
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Per-client limit on /api/analyze
    pub analyze_per_minute: u32,
    /// Per-client limit across all routes except /health
    pub requests_per_hour: u32,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            analyze_per_minute: 10,
            requests_per_hour: 50,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Session persistence settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file path; ":memory:" keeps sessions in process memory
    pub database_path: String,
    /// Number of image characters kept with each session
    pub image_preview_chars: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "newtons_lens.db".to_string(),
            image_preview_chars: 1000,
        }
    }
}

/// Filter used when RUST_LOG is unset.
pub const DEFAULT_LOG_FILTER: &str = "newtons_lens=info,tower_http=info";

/// Tracing filter from RUST_LOG, or the default.
pub fn log_filter(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup("RUST_LOG")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Load LENS_ENV_FILE if set, otherwise ./.env when present.
/// Variables already in the environment are not overwritten.
pub fn load_env_file() {
    if let Ok(env_path) = std::env::var("LENS_ENV_FILE") {
        let _ = dotenvy::from_path(env_path);
    } else {
        let _ = dotenvy::dotenv();
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub gemini_api_key: Option<String>,
}

impl RuntimeConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            gemini_api_key: lookup("GEMINI_API_KEY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses NEWTONS_LENS_CONFIG environment variable or defaults to "newtons_lens.toml"
    pub fn load() -> anyhow::Result<Self> {
        load_env_file();

        let config_path = std::env::var("NEWTONS_LENS_CONFIG")
            .unwrap_or_else(|_| "newtons_lens.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            toml::from_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of file values (env-first).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("GEMINI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model.name = model.trim().to_string();
        }
        if let Some(base) = lookup("GEMINI_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.model.api_base = base.trim().to_string();
        }
        if let Some(timeout) = lookup("GEMINI_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.model.request_timeout_ms = timeout;
        }

        if let Some(bind) = lookup("LENS_HTTP_BIND").and_then(|v| v.parse::<SocketAddr>().ok()) {
            self.server.bind = bind;
        } else if let Some(port) = lookup("PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.bind.set_port(port);
        }
        if let Some(n) = lookup("LENS_RATE_ANALYZE_PER_MINUTE").and_then(|v| v.parse().ok()) {
            self.server.analyze_per_minute = n;
        }
        if let Some(n) = lookup("LENS_RATE_PER_HOUR").and_then(|v| v.parse().ok()) {
            self.server.requests_per_hour = n;
        }
        if let Some(n) = lookup("LENS_MAX_BODY_BYTES").and_then(|v| v.parse().ok()) {
            self.server.max_body_bytes = n;
        }

        if let Some(path) = lookup("LENS_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.storage.database_path = path;
        }
        if let Some(n) = lookup("LENS_IMAGE_PREVIEW_CHARS").and_then(|v| v.parse().ok()) {
            self.storage.image_preview_chars = n;
        }

        self.runtime = RuntimeConfig::from_lookup(&lookup);
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model.name.trim().is_empty() {
            anyhow::bail!("model.name must not be empty");
        }
        if !self.model.api_base.starts_with("http://") && !self.model.api_base.starts_with("https://")
        {
            anyhow::bail!(
                "model.api_base '{}' must start with http:// or https://",
                self.model.api_base
            );
        }
        if self.model.request_timeout_ms == 0 {
            anyhow::bail!("GEMINI_TIMEOUT_MS must be > 0");
        }
        if self.server.analyze_per_minute == 0 {
            anyhow::bail!("LENS_RATE_ANALYZE_PER_MINUTE must be > 0");
        }
        if self.server.requests_per_hour == 0 {
            anyhow::bail!("LENS_RATE_PER_HOUR must be > 0");
        }
        if self.server.max_body_bytes == 0 {
            anyhow::bail!("LENS_MAX_BODY_BYTES must be > 0");
        }
        if self.storage.image_preview_chars == 0 {
            anyhow::bail!("LENS_IMAGE_PREVIEW_CHARS must be > 0");
        }
        Ok(())
    }
}
