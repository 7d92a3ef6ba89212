//! Turns a question plus retrieved chunks into an [`Answer`].
//!
//! The responder builds a grounded prompt from the retrieved passages and asks
//! a [`LanguageModel`] to answer from that context only. When nothing was
//! retrieved the model is not consulted at all and the fixed
//! [`NOT_AVAILABLE`] reply is returned, so an empty retrieval can never turn
//! into a fabricated answer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::{Answer, SearchResult};
use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, Prompt};
use crate::retry::{RetryConfig, with_timeout};

/// The reply given when the retrieved context cannot answer the question.
pub const NOT_AVAILABLE: &str = "The information is not available in the provided context.";

const DEFAULT_PERSONA: &str =
    "You are a helpful assistant that answers questions about a collection of documents.";

/// How the instructions handed to the model are assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Who the model is.
    pub persona: String,
    /// Optional formatting request, e.g. "Answer in at most three bullet points.".
    pub output_format: Option<String>,
    /// Marker line separating context passages.
    pub delimiter: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { persona: DEFAULT_PERSONA.to_string(), output_format: None, delimiter: "###".to_string() }
    }
}

impl PromptTemplate {
    /// Replace the persona.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Request a specific output format.
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    /// Change the passage delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// The system instructions: persona, grounding rules and output format.
    pub fn instructions(&self) -> String {
        let mut instructions = format!(
            "{}\n\nThe context passages are separated by lines containing only {}. \
             Answer using only the information in those passages. \
             If they do not contain the answer, reply exactly: {NOT_AVAILABLE}",
            self.persona, self.delimiter
        );
        if let Some(format) = &self.output_format {
            instructions.push_str("\n\n");
            instructions.push_str(format);
        }
        instructions
    }

    /// Assemble a prompt for `question` over `context`.
    pub fn render(&self, question: &str, context: Vec<String>) -> Prompt {
        Prompt {
            instructions: self.instructions(),
            context,
            question: question.to_string(),
            delimiter: self.delimiter.clone(),
        }
    }
}

/// Produces grounded answers with a [`LanguageModel`].
///
/// Context passages are taken best-first until `max_context_chars` would be
/// exceeded; the best passage is always included. Each model call runs under
/// the request timeout. Generation is not retried unless a policy is set with
/// [`with_retry`](Responder::with_retry).
#[derive(Clone)]
pub struct Responder {
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    max_context_chars: usize,
    timeout: Duration,
    retry: RetryConfig,
}

impl Responder {
    /// Create a responder with the default template, a 6000 character context
    /// budget and a 30 second timeout.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        let defaults = RagConfig::default();
        Self {
            model,
            template: PromptTemplate::default(),
            max_context_chars: defaults.max_context_chars,
            timeout: defaults.request_timeout(),
            retry: RetryConfig::no_retry(),
        }
    }

    /// Create a responder using the context budget and timeout of `config`.
    pub fn from_config(model: Arc<dyn LanguageModel>, config: &RagConfig) -> Self {
        Self::new(model)
            .with_max_context_chars(config.max_context_chars)
            .with_timeout(config.request_timeout())
    }

    /// Use a custom prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Set the context budget in characters.
    pub fn with_max_context_chars(mut self, chars: usize) -> Self {
        self.max_context_chars = chars;
        self
    }

    /// Set the timeout for each model call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry transient generation failures with `retry`.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The template in use.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Answer `question` from `results`, which must be ordered best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the model fails or replies
    /// with empty text, and [`RagError::Timeout`] if it does not reply in time.
    pub async fn respond(&self, question: &str, results: Vec<SearchResult>) -> Result<Answer> {
        if results.is_empty() {
            info!(question_len = question.len(), "no context retrieved, answering not available");
            return Ok(Answer { text: NOT_AVAILABLE.to_string(), sources: Vec::new(), grounded: false });
        }

        let sources = self.select_context(results);
        let context = sources.iter().map(|r| r.chunk.text.clone()).collect();
        let prompt = self.template.render(question, context);

        debug!(
            model = self.model.name(),
            passages = sources.len(),
            "generating answer"
        );

        let model = &self.model;
        let prompt = &prompt;
        let timeout = self.timeout;
        let reply = self
            .retry
            .run("generate", move || async move {
                with_timeout("generate", timeout, model.generate(prompt)).await
            })
            .await
            .inspect_err(|e| error!(model = self.model.name(), error = %e, "generation failed"))?;

        let text = reply.trim();
        if text.is_empty() {
            error!(model = self.model.name(), "model returned an empty reply");
            return Err(RagError::GenerationError {
                model: self.model.name().to_string(),
                message: "model returned an empty reply".to_string(),
                transient: false,
            });
        }

        // A model that declines keeps its sources but is not a grounded answer.
        let grounded = text != NOT_AVAILABLE;
        if !grounded {
            info!(model = self.model.name(), "model declined to answer from the context");
        }
        Ok(Answer { text: text.to_string(), sources, grounded })
    }

    fn select_context(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut used = 0;
        let mut selected = Vec::with_capacity(results.len());
        for result in results {
            let len = result.chunk.text.chars().count();
            if !selected.is_empty() && used + len > self.max_context_chars {
                break;
            }
            used += len;
            selected.push(result);
        }
        selected
    }
}
