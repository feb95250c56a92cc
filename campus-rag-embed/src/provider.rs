//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Current Ollama embedding endpoint (batch input)
pub const EMBED_PATH: &str = "/api/embed";

/// Legacy Ollama embedding endpoint (single prompt)
pub const LEGACY_EMBED_PATH: &str = "/api/embeddings";

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first
    /// vector, or 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    /// Identifier of the model producing the vectors
    fn model_name(&self) -> &str;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct LegacyEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct LegacyEmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by a local Ollama server.
///
/// Each call first tries `POST /api/embed` with `{model, input: [text]}`. Any
/// failure of that request (transport error, non-success status, or a payload
/// without a usable vector) falls back to `POST /api/embeddings` with
/// `{model, prompt}`, the endpoint older Ollama releases expose. A failure of
/// the fallback is returned to the caller.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    config: EmbedConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Build a provider with an HTTP client carrying the configured timeout.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Build a provider from `EMBED_MODEL`, `OLLAMA_BASE_URL` and `OLLAMA_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        Self::new(EmbedConfig::from_env()?)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let url = self.config.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EmbedError::from_transport(e, path, self.config.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EmbedError::from_transport(e, path, self.config.timeout))?;

        if !status.is_success() {
            return Err(EmbedError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn embed_current(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.config.model_name,
            input: [text],
        };
        let body = self.post_json(EMBED_PATH, &request).await?;
        parse_embed_response(&body)
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>> {
        let request = LegacyEmbedRequest {
            model: &self.config.model_name,
            prompt: text,
        };
        let body = self.post_json(LEGACY_EMBED_PATH, &request).await?;
        parse_legacy_response(&body)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        match self.embed_current(text).await {
            Ok(vector) => Ok(vector),
            Err(e) => {
                tracing::warn!(
                    "{} failed ({}), falling back to {}",
                    EMBED_PATH,
                    e,
                    LEGACY_EMBED_PATH
                );
                self.embed_legacy(text).await
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// Extract the first vector of an `/api/embed` response body.
pub fn parse_embed_response(body: &str) -> Result<Vec<f32>> {
    let parsed: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::malformed(format!("{EMBED_PATH}: {e}")))?;
    parsed
        .embeddings
        .into_iter()
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EmbedError::malformed(format!("{EMBED_PATH}: no embedding returned")))
}

/// Extract the vector of an `/api/embeddings` response body.
pub fn parse_legacy_response(body: &str) -> Result<Vec<f32>> {
    let parsed: LegacyEmbedResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::malformed(format!("{LEGACY_EMBED_PATH}: {e}")))?;
    if parsed.embedding.is_empty() {
        return Err(EmbedError::malformed(format!(
            "{LEGACY_EMBED_PATH}: empty embedding"
        )));
    }
    Ok(parsed.embedding)
}
