//! Configuration for the embedding service client

use crate::error::{EmbedError, Result};
use std::time::Duration;

/// Model used when `EMBED_MODEL` is not set
pub const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Ollama endpoint used when `OLLAMA_BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Per-request timeout, in seconds, used when `OLLAMA_TIMEOUT` is not set
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const ENV_MODEL: &str = "EMBED_MODEL";
pub const ENV_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_TIMEOUT: &str = "OLLAMA_TIMEOUT";

/// Configuration for an HTTP embedding provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfig {
    /// Base URL of the embedding service, without a trailing slash
    pub base_url: String,
    /// Identifier of the embedding model. Part of the index validity key.
    pub model_name: String,
    /// Timeout applied to every embedding request
    pub timeout: Duration,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for `model_name` served at `base_url`
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self::default()
            .with_base_url(base_url)
            .with_model(model_name)
    }

    /// Read `EMBED_MODEL`, `OLLAMA_BASE_URL` and `OLLAMA_TIMEOUT` from the process
    /// environment, falling back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EmbedConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            config = config.with_model(model.trim());
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(url.trim());
        }
        if let Some(raw) = lookup(ENV_TIMEOUT).filter(|v| !v.trim().is_empty()) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                EmbedError::invalid_config(format!("{ENV_TIMEOUT} is not a number: {raw}"))
            })?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(EmbedError::invalid_config(format!(
                    "{ENV_TIMEOUT} must be positive, got {raw}"
                )));
            }
            config = config.with_timeout(Duration::from_secs_f64(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the base URL (builder style). A trailing slash is stripped.
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, ..self }
    }

    /// Set the model name (builder style)
    pub fn with_model(self, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..self
        }
    }

    /// Set the request timeout (builder style)
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Full URL for an API path such as `/api/embed`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check that the configuration can be used to issue requests
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(EmbedError::invalid_config(format!(
                "base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(EmbedError::invalid_config("timeout must be positive"));
        }
        Ok(())
    }
}
