//! Embedding provider trait and an offline hashing embedder.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::similarity::normalize;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. Every vector a provider returns has exactly
/// [`dimensions`](EmbeddingProvider::dimensions) entries, and a provider is
/// deterministic for a fixed model version. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    ///
    /// Fails with [`RagError::EmbeddingError`] if the input exceeds the
    /// model's token limit or the backend is unavailable.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// The maximum number of input tokens accepted per text, if known.
    fn max_input_tokens(&self) -> Option<usize> {
        None
    }

    /// A short name for log output and error messages.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Verify that every vector has the provider's dimensionality.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingError`] naming the first offending vector.
pub fn check_dimensions(provider: &dyn EmbeddingProvider, vectors: &[Vec<f32>]) -> Result<()> {
    let expected = provider.dimensions();
    match vectors.iter().position(|v| v.len() != expected) {
        Some(i) => Err(RagError::EmbeddingError {
            provider: provider.name().to_string(),
            message: format!(
                "vector {i} has {} dimensions, expected {expected}",
                vectors[i].len()
            ),
            transient: false,
        }),
        None => Ok(()),
    }
}

/// A deterministic, offline embedding provider based on feature hashing.
///
/// Text is lowercased and split into alphanumeric tokens; each token is
/// hashed (FNV-1a) into one of `dimensions` buckets with a hash-derived sign,
/// and the resulting vector is L2-normalized. Texts sharing vocabulary score
/// higher under cosine similarity, which is enough for demos, tests and
/// small offline corpora.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::HashEmbeddingProvider;
///
/// let provider = HashEmbeddingProvider::new(256);
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
    max_tokens: usize,
}

impl HashEmbeddingProvider {
    /// Default token limit per input text.
    pub const DEFAULT_MAX_TOKENS: usize = 8192;

    /// Create a provider producing vectors of `dimensions` entries (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), max_tokens: Self::DEFAULT_MAX_TOKENS }
    }

    /// Override the per-text token limit.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn fnv1a(token: &str) -> u64 {
        token.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        })
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens: Vec<String> = Self::tokens(text).collect();
        if tokens.len() > self.max_tokens {
            return Err(RagError::EmbeddingError {
                provider: self.name().to_string(),
                message: format!(
                    "input has {} tokens, limit is {}",
                    tokens.len(),
                    self.max_tokens
                ),
                transient: false,
            });
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for token in &tokens {
            let hash = Self::fnv1a(token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }
        normalize(&mut embedding);

        debug!(provider = self.name(), tokens = tokens.len(), "embedded text");
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_tokens(&self) -> Option<usize> {
        Some(self.max_tokens)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[tokio::test]
    async fn hash_embeddings_are_deterministic_and_sized() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed("Rust memory safety").await.unwrap();
        let b = provider.embed("Rust memory safety").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let provider = HashEmbeddingProvider::new(256);
        let query = provider.embed("vector database search").await.unwrap();
        let related = provider.embed("a vector database supports similarity search").await.unwrap();
        let unrelated = provider.embed("bake bread with flour and yeast").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn rejects_input_over_token_limit() {
        let provider = HashEmbeddingProvider::new(8).with_max_tokens(3);
        let err = provider.embed("one two three four").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingError { .. }));
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddingProvider::new(8);
        let v = provider.embed("").await.unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[test]
    fn check_dimensions_flags_wrong_length() {
        let provider = HashEmbeddingProvider::new(4);
        assert!(check_dimensions(&provider, &[vec![0.0; 4], vec![0.0; 4]]).is_ok());
        assert!(check_dimensions(&provider, &[vec![0.0; 4], vec![0.0; 3]]).is_err());
    }
}
