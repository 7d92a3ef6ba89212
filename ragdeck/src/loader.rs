//! Loaders turn source locators (URLs, file paths) into [`Document`]s.
//!
//! [`WebLoader`] fetches `http`/`https` pages (feature `web`), [`FileLoader`]
//! reads local files, and [`SourceLoader`] dispatches between the two by
//! locator scheme.

use std::path::PathBuf;
#[cfg(feature = "web")]
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::document::Document;
use crate::error::{RagError, Result};
use crate::html;
#[cfg(feature = "web")]
use crate::retry::{RetryConfig, with_timeout};

/// Fetches a single source and produces a [`Document`].
///
/// Implementations set the document ID to the locator and record the locator
/// as the `source` metadata field.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load one locator.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::FetchError`] if the source is unreachable or
    /// malformed. The error's `transient` flag says whether retrying may help.
    async fn load(&self, locator: &str) -> Result<Document>;

    /// Load every locator, collecting failures instead of aborting.
    ///
    /// Documents are returned in locator order. Each skipped locator is logged
    /// at `warn` and recorded in [`LoadReport::failures`].
    async fn load_all(&self, locators: &[&str]) -> LoadReport {
        let mut report = LoadReport::default();
        for &locator in locators {
            match self.load(locator).await {
                Ok(document) => report.documents.push(document),
                Err(error) => {
                    warn!(locator, error = %error, "skipping source");
                    report.failures.push(LoadFailure { locator: locator.to_string(), error });
                }
            }
        }
        info!(
            loaded = report.documents.len(),
            failed = report.failures.len(),
            "finished loading sources"
        );
        report
    }
}

/// The outcome of [`Loader::load_all`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded documents, in locator order.
    pub documents: Vec<Document>,
    /// Locators that could not be loaded.
    pub failures: Vec<LoadFailure>,
}

/// A locator that failed to load.
#[derive(Debug)]
pub struct LoadFailure {
    /// The locator as given.
    pub locator: String,
    /// Why it failed.
    pub error: RagError,
}

fn fetch_error(locator: &str, message: impl Into<String>, transient: bool) -> RagError {
    RagError::FetchError { locator: locator.to_string(), message: message.into(), transient }
}

fn is_html_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Build a document from an HTML body, recording its title if it has one.
fn html_document(locator: &str, body: &str) -> Document {
    let document = Document::new(locator, html::extract_text(body)).with_source(locator);
    match html::extract_title(body) {
        Some(title) => document.with_metadata("title", title),
        None => document,
    }
}

// ── Web ────────────────────────────────────────────────────────────

/// Loads `http` and `https` URLs with `reqwest`.
///
/// HTML responses are reduced to their visible text; `text/plain` and other
/// `text/*` bodies are kept as-is. Connection failures, timeouts, HTTP 429 and
/// 5xx responses are retried with the configured [`RetryConfig`]. Other 4xx
/// responses, unsupported content types and pages without text fail
/// immediately.
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct WebLoader {
    client: reqwest::Client,
    retry: RetryConfig,
    timeout: Duration,
}

#[cfg(feature = "web")]
impl WebLoader {
    /// The `User-Agent` header sent with every request.
    pub const USER_AGENT: &'static str = concat!("ragdeck/", env!("CARGO_PKG_VERSION"));

    /// Create a loader with the default retry policy and a 30 second timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, retry: RetryConfig::default(), timeout: Duration::from_secs(30) })
    }

    /// Create a loader using the retry policy and request timeout of `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Ok(Self::new()?.with_retry(config.retry.clone()).with_timeout(config.request_timeout()))
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the timeout applied to each request attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_once(&self, url: &url::Url, locator: &str) -> Result<Document> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(locator, format!("request failed: {e}"), !e.is_builder()))?;

        let status = response.status();
        if !status.is_success() {
            let transient =
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(fetch_error(locator, format!("HTTP {status}"), transient));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let is_html = content_type.is_empty()
            || content_type.contains("text/html")
            || content_type.contains("application/xhtml");
        if !is_html && !content_type.starts_with("text/") {
            return Err(fetch_error(
                locator,
                format!("unsupported content type: {content_type}"),
                false,
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(locator, format!("failed to read body: {e}"), true))?;

        let document = if is_html {
            html_document(locator, &body)
        } else {
            Document::new(locator, body).with_source(locator)
        };
        if document.text.trim().is_empty() {
            return Err(fetch_error(locator, "page contains no text", false));
        }

        debug!(locator, %status, text_len = document.text.len(), "fetched page");
        Ok(document.with_metadata("content_type", content_type))
    }
}

#[cfg(feature = "web")]
#[async_trait]
impl Loader for WebLoader {
    async fn load(&self, locator: &str) -> Result<Document> {
        let url = url::Url::parse(locator)
            .map_err(|e| fetch_error(locator, format!("invalid URL: {e}"), false))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(fetch_error(
                locator,
                format!("unsupported scheme '{}' (only http and https)", url.scheme()),
                false,
            ));
        }

        let url = &url;
        self.retry
            .run("fetch", move || async move {
                with_timeout("fetch", self.timeout, self.fetch_once(url, locator)).await.map_err(
                    |e| match e {
                        RagError::Timeout { .. } => fetch_error(locator, e.to_string(), true),
                        other => other,
                    },
                )
            })
            .await
    }
}

// ── Files ──────────────────────────────────────────────────────────

/// Loads local files. Accepts plain paths and `file://` URLs.
///
/// `.html` and `.htm` files are reduced to their visible text; anything else
/// must be UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    /// Create a file loader.
    pub fn new() -> Self {
        Self
    }

    fn resolve(locator: &str) -> Result<PathBuf> {
        if locator.starts_with("file://") {
            let url = url::Url::parse(locator)
                .map_err(|e| fetch_error(locator, format!("invalid file URL: {e}"), false))?;
            return url
                .to_file_path()
                .map_err(|()| fetch_error(locator, "file URL has no local path", false));
        }
        Ok(PathBuf::from(locator))
    }
}

#[async_trait]
impl Loader for FileLoader {
    async fn load(&self, locator: &str) -> Result<Document> {
        let path = Self::resolve(locator)?;
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| fetch_error(locator, format!("failed to read {}: {e}", path.display()), false))?;

        let document = if is_html_path(&path) {
            html_document(locator, &body)
        } else {
            Document::new(locator, body).with_source(locator)
        };

        debug!(locator, text_len = document.text.len(), "read file");
        Ok(document)
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Routes `http://` and `https://` locators to a [`WebLoader`] and everything
/// else to a [`FileLoader`].
#[derive(Debug, Clone)]
pub struct SourceLoader {
    #[cfg(feature = "web")]
    web: WebLoader,
    file: FileLoader,
}

impl SourceLoader {
    /// Create a loader with default web settings.
    pub fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(feature = "web")]
            web: WebLoader::new()?,
            file: FileLoader::new(),
        })
    }

    /// Create a loader using the retry policy and request timeout of `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        #[cfg(not(feature = "web"))]
        let _ = config;
        Ok(Self {
            #[cfg(feature = "web")]
            web: WebLoader::from_config(config)?,
            file: FileLoader::new(),
        })
    }
}

fn is_web_locator(locator: &str) -> bool {
    let lower = locator.get(..8).unwrap_or(locator).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl Loader for SourceLoader {
    async fn load(&self, locator: &str) -> Result<Document> {
        if !is_web_locator(locator) {
            return self.file.load(locator).await;
        }

        #[cfg(feature = "web")]
        {
            self.web.load(locator).await
        }
        #[cfg(not(feature = "web"))]
        {
            Err(fetch_error(locator, "loading URLs requires the `web` feature", false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_loader_reads_text_and_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "Rust is a systems language.").await.unwrap();

        let locator = path.to_str().unwrap();
        let doc = FileLoader::new().load(locator).await.unwrap();
        assert_eq!(doc.id, locator);
        assert_eq!(doc.text, "Rust is a systems language.");
        assert_eq!(doc.metadata.get("source").map(String::as_str), Some(locator));
    }

    #[tokio::test]
    async fn file_loader_extracts_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        tokio::fs::write(&path, "<html><head><title>Deck</title></head><body><p>Slide one</p></body></html>")
            .await
            .unwrap();

        let doc = FileLoader::new().load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(doc.text, "Slide one");
        assert_eq!(doc.metadata.get("title").map(String::as_str), Some("Deck"));
    }

    #[tokio::test]
    async fn file_loader_accepts_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.md");
        tokio::fs::write(&path, "# Title").await.unwrap();

        let url = url::Url::from_file_path(&path).unwrap();
        let doc = FileLoader::new().load(url.as_str()).await.unwrap();
        assert_eq!(doc.text, "# Title");
    }

    #[tokio::test]
    async fn missing_file_is_permanent_fetch_error() {
        let err = FileLoader::new().load("/definitely/not/here.txt").await.unwrap_err();
        assert!(matches!(err, RagError::FetchError { transient: false, .. }));
    }

    #[tokio::test]
    async fn load_all_collects_failures_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        tokio::fs::write(&good, "content").await.unwrap();
        let good = good.to_str().unwrap();

        let report = FileLoader::new().load_all(&[good, "/missing/one.txt", good]).await;
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].locator, "/missing/one.txt");
    }

    #[test]
    fn web_locators_are_detected_case_insensitively() {
        assert!(is_web_locator("https://example.com"));
        assert!(is_web_locator("HTTP://example.com"));
        assert!(!is_web_locator("file:///tmp/a.txt"));
        assert!(!is_web_locator("notes/https.txt"));
        assert!(!is_web_locator("é"));
    }

    #[cfg(feature = "web")]
    #[tokio::test]
    async fn web_loader_rejects_bad_urls_without_retrying() {
        let loader = WebLoader::new().unwrap();
        for locator in ["not a url", "ftp://example.com/file"] {
            let err = loader.load(locator).await.unwrap_err();
            assert!(matches!(err, RagError::FetchError { transient: false, .. }), "{locator}");
        }
    }
}
