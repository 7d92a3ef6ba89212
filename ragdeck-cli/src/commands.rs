//! Subcommand implementations.
//!
//! Each command opens the snapshot index, assembles a [`RagPipeline`] for the
//! job and returns plain data; [`run`] renders it to stdout.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use ragdeck::{
    Answer, Chunker, EmbeddingProvider, ExtractiveModel, FixedSizeChunker, HashEmbeddingProvider,
    InMemoryVectorStore, IngestReport, LanguageModel, MarkdownChunker, RagConfig, RagPipeline,
    RecursiveChunker, SearchResult, SourceLoader, WordChunker,
};
use tracing::info;

use crate::cli::{
    AskArgs, Cli, Command, EmbedderArgs, EmbedderKind, IngestArgs, ModelKind, SearchArgs, SplitterKind,
};

const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Execute the parsed command line, printing results to stdout.
pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Ingest(args) => {
            let report = ingest(&cli.index, &cli.collection, &cli.embedder, args).await?;
            print!("{}", render_report(&report, &cli.collection));
            if report.documents_ingested == 0 && !report.failures.is_empty() {
                bail!("no sources could be ingested");
            }
        }
        Command::Search(args) => {
            let results = search(&cli.index, &cli.collection, &cli.embedder, args).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print!("{}", render_results(&results));
            }
        }
        Command::Ask(args) => {
            let answer = ask(&cli.index, &cli.collection, &cli.embedder, args).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print!("{}", render_answer(&answer));
            }
        }
    }
    Ok(())
}

/// Load, split, embed and store `args.sources`, then save the snapshot.
pub async fn ingest(
    index: &Path,
    collection: &str,
    embedder: &EmbedderArgs,
    args: &IngestArgs,
) -> Result<IngestReport> {
    let config = RagConfig::builder()
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .ingest_concurrency(args.concurrency)
        .build()?;

    let store = Arc::new(open_index(index).await?);
    let pipeline = RagPipeline::builder()
        .chunker(chunker(args.splitter, args.chunk_size, args.chunk_overlap)?)
        .loader(Arc::new(SourceLoader::from_config(&config)?))
        .config(config)
        .embedding_provider(embedding_provider(embedder)?)
        .vector_store(store.clone())
        .build()?;

    pipeline.create_collection(collection).await?;
    let locators: Vec<&str> = args.sources.iter().map(String::as_str).collect();
    let report = pipeline.ingest_sources(collection, &locators).await?;

    store
        .save(index)
        .await
        .with_context(|| format!("failed to save index to {}", index.display()))?;
    info!(index = %index.display(), collection, "saved index");
    Ok(report)
}

/// Retrieve the chunks most similar to `args.query`.
pub async fn search(
    index: &Path,
    collection: &str,
    embedder: &EmbedderArgs,
    args: &SearchArgs,
) -> Result<Vec<SearchResult>> {
    let pipeline = query_pipeline(index, collection, embedder, None).await?;
    Ok(pipeline.retrieve_with_top_k(collection, &args.query, args.top_k).await?)
}

/// Answer `args.question` from the indexed material.
pub async fn ask(
    index: &Path,
    collection: &str,
    embedder: &EmbedderArgs,
    args: &AskArgs,
) -> Result<Answer> {
    let model = language_model(args, embedder)?;
    let pipeline = query_pipeline(index, collection, embedder, Some(model)).await?;
    Ok(pipeline.ask_with_top_k(collection, &args.question, args.top_k).await?)
}

async fn open_index(index: &Path) -> Result<InMemoryVectorStore> {
    InMemoryVectorStore::load_or_default(index)
        .await
        .with_context(|| format!("failed to open index {}", index.display()))
}

async fn query_pipeline(
    index: &Path,
    collection: &str,
    embedder: &EmbedderArgs,
    model: Option<Arc<dyn LanguageModel>>,
) -> Result<RagPipeline> {
    let store = open_index(index).await?;
    let Some(dimensions) = store.dimensions(collection).await else {
        bail!(
            "collection '{collection}' not found in {}; run `ragdeck ingest` first",
            index.display()
        );
    };

    let provider = embedding_provider(embedder)?;
    if provider.dimensions() != dimensions {
        bail!(
            "collection '{collection}' holds {dimensions}-dimensional vectors but the {} embedder produces {}",
            provider.name(),
            provider.dimensions()
        );
    }

    let config = RagConfig::default();
    let mut builder = RagPipeline::builder()
        .chunker(Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)))
        .config(config)
        .embedding_provider(provider)
        .vector_store(Arc::new(store));
    if let Some(model) = model {
        builder = builder.language_model(model);
    }
    Ok(builder.build()?)
}

fn chunker(kind: SplitterKind, size: usize, overlap: usize) -> Result<Arc<dyn Chunker>> {
    let chunker: Arc<dyn Chunker> = match kind {
        SplitterKind::Chars => Arc::new(FixedSizeChunker::try_new(size, overlap)?),
        SplitterKind::Words => Arc::new(WordChunker::try_new(size, overlap)?),
        SplitterKind::Recursive => Arc::new(RecursiveChunker::try_new(size, overlap)?),
        SplitterKind::Markdown => Arc::new(MarkdownChunker::try_new(size, overlap)?),
    };
    Ok(chunker)
}

fn embedding_provider(args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    match args.embedder {
        EmbedderKind::Hash => Ok(Arc::new(HashEmbeddingProvider::new(
            args.dimensions.unwrap_or(DEFAULT_HASH_DIMENSIONS),
        ))),
        EmbedderKind::Openai => openai_embedder(args),
    }
}

fn language_model(args: &AskArgs, embedder: &EmbedderArgs) -> Result<Arc<dyn LanguageModel>> {
    match args.model {
        ModelKind::Extractive => Ok(Arc::new(ExtractiveModel)),
        ModelKind::Openai => openai_chat_model(&args.chat_model, embedder),
    }
}

#[cfg(feature = "openai")]
fn openai_embedder(args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    use ragdeck::openai::OpenAIEmbeddingProvider;

    let api_key = args.api_key.clone().context("--api-key or OPENAI_API_KEY is required")?;
    let mut provider = OpenAIEmbeddingProvider::new(api_key)?;
    if let Some(base_url) = &args.base_url {
        provider = provider.with_base_url(base_url);
    }
    if let Some(model) = &args.embedding_model {
        provider = provider.with_model(model);
    }
    if let Some(dimensions) = args.dimensions {
        provider = provider.with_dimensions(dimensions);
    }
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "openai"))]
fn openai_embedder(_args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    bail!("this build of ragdeck does not include the `openai` feature")
}

#[cfg(feature = "openai")]
fn openai_chat_model(model: &str, args: &EmbedderArgs) -> Result<Arc<dyn LanguageModel>> {
    use ragdeck::openai::OpenAIChatModel;

    let api_key = args.api_key.clone().context("--api-key or OPENAI_API_KEY is required")?;
    let mut chat = OpenAIChatModel::new(api_key, model)?;
    if let Some(base_url) = &args.base_url {
        chat = chat.with_base_url(base_url);
    }
    Ok(Arc::new(chat))
}

#[cfg(not(feature = "openai"))]
fn openai_chat_model(_model: &str, _args: &EmbedderArgs) -> Result<Arc<dyn LanguageModel>> {
    bail!("this build of ragdeck does not include the `openai` feature")
}

// ── Rendering ──────────────────────────────────────────────────────

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

fn label(result: &SearchResult) -> String {
    let source = result.chunk.source().unwrap_or(&result.chunk.document_id);
    match result.chunk.index() {
        Some(index) => format!("{source}#{index}"),
        None => source.to_string(),
    }
}

pub fn render_report(report: &IngestReport, collection: &str) -> String {
    let mut out = format!(
        "Ingested {} document(s), {} chunk(s) into '{collection}'\n",
        report.documents_ingested, report.chunks_stored
    );
    for failure in &report.failures {
        let _ = writeln!(out, "  skipped {}: {}", failure.document_id, failure.error);
    }
    out
}

pub fn render_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No matching chunks.\n".to_string();
    }
    let mut out = String::new();
    for (rank, result) in results.iter().enumerate() {
        let _ = writeln!(out, "{}. [{:.3}] {}", rank + 1, result.score, label(result));
        let _ = writeln!(out, "   {}", snippet(&result.chunk.text, 200));
    }
    out
}

pub fn render_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.text);
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for result in &answer.sources {
            let _ = writeln!(out, "  [{:.3}] {}", result.score, label(result));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[tokio::test]
    async fn ingest_then_search_and_ask_round_trip_through_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.json");
        let slides = dir.path().join("slides.md");
        tokio::fs::write(
            &slides,
            "# Loader\nThe loader fetches web pages and files.\n\n# Store\nThe store keeps vectors and runs similarity search.",
        )
        .await
        .unwrap();

        let index_arg = index.to_str().unwrap();
        let cli = parse(&[
            "ragdeck", "--index", index_arg, "ingest", slides.to_str().unwrap(),
            "--splitter", "markdown", "--chunk-size", "200", "--chunk-overlap", "0",
        ]);
        let Command::Ingest(args) = &cli.command else { unreachable!() };
        let report = ingest(&cli.index, &cli.collection, &cli.embedder, args).await.unwrap();
        assert_eq!(report.documents_ingested, 1);
        assert_eq!(report.chunks_stored, 2);
        assert!(index.exists());

        let cli = parse(&["ragdeck", "--index", index_arg, "search", "similarity search vectors", "-k", "1"]);
        let Command::Search(args) = &cli.command else { unreachable!() };
        let results = search(&cli.index, &cli.collection, &cli.embedder, args).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.metadata.get("header_path").map(String::as_str), Some("Store"));

        let cli = parse(&["ragdeck", "--index", index_arg, "ask", "What does the loader fetch?"]);
        let Command::Ask(args) = &cli.command else { unreachable!() };
        let answer = ask(&cli.index, &cli.collection, &cli.embedder, args).await.unwrap();
        assert!(answer.grounded);
        assert!(answer.text.contains("loader fetches"));
        assert!(render_answer(&answer).contains("Sources:"));
    }

    #[tokio::test]
    async fn search_without_index_explains_how_to_fix_it() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("missing.json");
        let cli = parse(&["ragdeck", "--index", index.to_str().unwrap(), "search", "anything"]);
        let Command::Search(args) = &cli.command else { unreachable!() };
        let err = search(&cli.index, &cli.collection, &cli.embedder, args).await.unwrap_err();
        assert!(err.to_string().contains("ragdeck ingest"));
    }

    #[tokio::test]
    async fn mismatched_embedder_dimensions_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.json");
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "some text to index").await.unwrap();
        let index_arg = index.to_str().unwrap();

        let cli = parse(&["ragdeck", "--index", index_arg, "ingest", file.to_str().unwrap()]);
        let Command::Ingest(args) = &cli.command else { unreachable!() };
        ingest(&cli.index, &cli.collection, &cli.embedder, args).await.unwrap();

        let cli = parse(&["ragdeck", "--index", index_arg, "--dimensions", "64", "search", "text"]);
        let Command::Search(args) = &cli.command else { unreachable!() };
        let err = search(&cli.index, &cli.collection, &cli.embedder, args).await.unwrap_err();
        assert!(err.to_string().contains("256-dimensional"));
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("héllo   wörld", 5), "héllo…");
        assert_eq!(snippet("short", 10), "short");
    }

    #[test]
    fn report_lists_failures() {
        let report = IngestReport {
            chunks_stored: 3,
            documents_ingested: 1,
            failures: vec![ragdeck::IngestFailure {
                document_id: "https://example.com/404".into(),
                error: ragdeck::RagError::FetchError {
                    locator: "https://example.com/404".into(),
                    message: "HTTP 404 Not Found".into(),
                    transient: false,
                },
            }],
        };
        let text = render_report(&report, "deck");
        assert!(text.starts_with("Ingested 1 document(s), 3 chunk(s) into 'deck'"));
        assert!(text.contains("skipped https://example.com/404"));
    }
}
