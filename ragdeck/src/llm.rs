//! Language model abstraction used by the responder.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};

/// A fully assembled request to a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// System-level instructions: persona, grounding rules, output format.
    pub instructions: String,
    /// Retrieved passages, best first.
    pub context: Vec<String>,
    /// The user's question.
    pub question: String,
    /// Marker line written around each context passage.
    pub delimiter: String,
}

impl Prompt {
    /// Render the context passages and the question as one user message.
    ///
    /// Each passage is preceded by the delimiter on its own line, and the
    /// block is closed by a final delimiter line.
    pub fn user_message(&self) -> String {
        let delimiter = self.delimiter.as_str();
        let mut message = String::new();
        if !self.context.is_empty() {
            message.push_str("Context:\n");
            for passage in &self.context {
                message.push_str(delimiter);
                message.push('\n');
                message.push_str(passage.trim());
                message.push('\n');
            }
            message.push_str(delimiter);
            message.push_str("\n\n");
        }
        message.push_str("Question: ");
        message.push_str(self.question.trim());
        message
    }
}

/// A text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A short name for log output and error messages.
    fn name(&self) -> &str;

    /// Generate a reply to `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the backend fails.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// An offline model that replies with the best-ranked context passage.
///
/// Useful when no hosted model is configured: the answer is always a verbatim
/// excerpt of the retrieved material.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveModel;

#[async_trait]
impl LanguageModel for ExtractiveModel {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        prompt
            .context
            .iter()
            .map(|passage| passage.trim())
            .find(|passage| !passage.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RagError::GenerationError {
                model: self.name().to_string(),
                message: "no context to extract from".to_string(),
                transient: false,
            })
    }
}

/// A scripted model for tests and demos.
///
/// Replies are taken from a queue; once it is empty the default reply is
/// returned. Every prompt is recorded for later inspection.
///
/// ```rust,ignore
/// let model = MockLanguageModel::new("fallback").then("first");
/// ```
#[derive(Debug, Default)]
pub struct MockLanguageModel {
    default_reply: String,
    script: Mutex<VecDeque<String>>,
    failure: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockLanguageModel {
    /// A model that always replies with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self { default_reply: reply.into(), ..Self::default() }
    }

    /// A model whose every call fails with a [`RagError::GenerationError`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::default() }
    }

    /// Queue a reply ahead of the default one.
    pub fn then(self, reply: impl Into<String>) -> Self {
        lock(&self.script).push_back(reply.into());
        self
    }

    /// Sleep for `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        lock(&self.prompts).clone()
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        lock(&self.prompts).push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(RagError::GenerationError {
                model: self.name().to_string(),
                message: message.clone(),
                transient: false,
            });
        }

        let reply = lock(&self.script).pop_front().unwrap_or_else(|| self.default_reply.clone());
        debug!(model = self.name(), reply_len = reply.len(), "generated reply");
        Ok(reply)
    }
}
