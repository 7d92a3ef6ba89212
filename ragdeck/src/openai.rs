//! OpenAI-compatible embedding and chat backends.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! clients talk to `{base_url}/embeddings` and `{base_url}/chat/completions`,
//! so any server implementing the OpenAI wire format (Ollama, vLLM, LM Studio)
//! works by overriding the base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, Prompt};

/// The default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "OpenAI";

fn api_key_from_env() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty())
}

fn base_url_from_env() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// Rate limiting and server errors are worth retrying.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Describe a failed send, and whether retrying it may succeed.
fn describe_send_error(e: &reqwest::Error) -> (String, bool) {
    let transient = e.is_connect() || e.is_timeout() || e.is_request();
    (format!("request failed: {e}"), transient)
}

/// Describe an unsuccessful response, and whether retrying it may succeed.
async fn describe_status_error(response: reqwest::Response) -> (String, bool) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    (format!("API returned {status}: {detail}"), is_retryable_status(status))
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `base_url` – defaults to `https://api.openai.com/v1`, or `OPENAI_BASE_URL`
///   when built with [`from_env`](Self::from_env).
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Self::embedding_error("API key must not be empty"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider from `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env()
            .ok_or_else(|| Self::embedding_error("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key)?.with_base_url(base_url_from_env()))
    }

    /// Point the provider at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn embedding_error(message: impl Into<String>) -> RagError {
        Self::embedding_failure(message, false)
    }

    fn embedding_failure(message: impl Into<String>, transient: bool) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message: message.into(), transient }
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| Self::embedding_error("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                let (message, transient) = describe_send_error(&e);
                Self::embedding_failure(message, transient)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let (message, transient) = describe_status_error(response).await;
            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::embedding_failure(message, transient));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::embedding_error(format!("failed to parse response: {e}"))
        })?;

        let mut data = embedding_response.data;
        if data.len() != texts.len() {
            return Err(Self::embedding_error(format!(
                "API returned {} embeddings for {} inputs",
                data.len(),
                texts.len()
            )));
        }
        data.sort_by_key(|d| d.index);

        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(Self::embedding_error(format!(
                "API returned {} dimensions, expected {}",
                bad.len(),
                self.dimensions
            )));
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_tokens(&self) -> Option<usize> {
        Some(8191)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`LanguageModel`] backed by the OpenAI chat completions API.
///
/// The prompt's instructions become the system message; the context block and
/// question become the user message.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIChatModel {
    /// Create a chat model with the given API key and model name.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let model = model.into();
        if api_key.is_empty() {
            return Err(RagError::GenerationError {
                model,
                message: "API key must not be empty".into(),
                transient: false,
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model,
            temperature: Some(0.0),
        })
    }

    /// Create a chat model from `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    ///
    /// `model` defaults to `gpt-4o-mini`.
    pub fn from_env(model: Option<&str>) -> Result<Self> {
        let model = model.unwrap_or(DEFAULT_CHAT_MODEL);
        let api_key = api_key_from_env().ok_or_else(|| RagError::GenerationError {
            model: model.to_string(),
            message: "OPENAI_API_KEY environment variable not set".into(),
            transient: false,
        })?;
        Ok(Self::new(api_key, model)?.with_base_url(base_url_from_env()))
    }

    /// Point the model at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the sampling temperature; `None` uses the server default.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn generation_error(&self, message: impl Into<String>) -> RagError {
        self.generation_failure(message, false)
    }

    fn generation_failure(&self, message: impl Into<String>, transient: bool) -> RagError {
        RagError::GenerationError { model: self.model.clone(), message: message.into(), transient }
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let user = prompt.user_message();
        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &prompt.instructions },
                ChatMessage { role: "user", content: &user },
            ],
            temperature: self.temperature,
        };

        debug!(provider = PROVIDER, model = %self.model, passages = prompt.context.len(), "chat completion");

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                let (message, transient) = describe_send_error(&e);
                self.generation_failure(message, transient)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let (message, transient) = describe_status_error(response).await;
            error!(provider = PROVIDER, %status, "API error");
            return Err(self.generation_failure(message, transient));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            self.generation_error(format!("failed to parse response: {e}"))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.generation_error("API returned no choices"))
    }
}
