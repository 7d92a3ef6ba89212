//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Build a local retrieval index from web pages and files, then search it or
/// ask questions against it.
#[derive(Debug, Parser)]
#[command(name = "ragdeck", version, about)]
pub struct Cli {
    /// Index snapshot file
    #[arg(long, env = "RAGDECK_INDEX", default_value = "ragdeck-index.json", global = true)]
    pub index: PathBuf,

    /// Collection inside the index
    #[arg(long, default_value = "default", global = true)]
    pub collection: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub embedder: EmbedderArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load, split, embed and store sources
    Ingest(IngestArgs),
    /// Print the chunks most similar to a query
    Search(SearchArgs),
    /// Answer a question from the indexed material
    Ask(AskArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// URLs or file paths to ingest
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Maximum chunk size, in the splitter's unit
    #[arg(long, default_value_t = 512)]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks
    #[arg(long, default_value_t = 100)]
    pub chunk_overlap: usize,

    /// Splitting strategy
    #[arg(long, value_enum, default_value_t = SplitterKind::Chars)]
    pub splitter: SplitterKind,

    /// Documents ingested concurrently
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Number of results
    #[arg(short = 'k', long, default_value_t = 4)]
    pub top_k: usize,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Question to answer
    pub question: String,

    /// Number of chunks retrieved as context
    #[arg(short = 'k', long, default_value_t = 4)]
    pub top_k: usize,

    /// Answering model
    #[arg(long, value_enum, default_value_t = ModelKind::Extractive)]
    pub model: ModelKind,

    /// Chat model name for `--model openai`
    #[arg(long, default_value = "gpt-4o-mini")]
    pub chat_model: String,

    /// Print the answer as JSON
    #[arg(long)]
    pub json: bool,
}

/// Embedding backend selection, shared by every subcommand.
#[derive(Debug, Args)]
pub struct EmbedderArgs {
    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Hash, global = true)]
    pub embedder: EmbedderKind,

    /// Embedding dimensions (hash: vector size, openai: Matryoshka truncation)
    #[arg(long, global = true)]
    pub dimensions: Option<usize>,

    /// Embedding model name for `--embedder openai`
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// API key for OpenAI-compatible backends
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Base URL for OpenAI-compatible backends
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SplitterKind {
    /// Fixed windows of characters
    Chars,
    /// Fixed windows of words
    Words,
    /// Paragraphs, then sentences, then words
    Recursive,
    /// Markdown sections
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Offline feature hashing
    Hash,
    /// OpenAI-compatible embeddings API
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// Reply with the best matching passage
    Extractive,
    /// OpenAI-compatible chat completions API
    Openai,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_with_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ragdeck",
            "ingest",
            "https://example.com",
            "notes.md",
            "--splitter",
            "markdown",
            "--index",
            "/tmp/idx.json",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.index, PathBuf::from("/tmp/idx.json"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(args.sources, vec!["https://example.com", "notes.md"]);
                assert_eq!(args.splitter, SplitterKind::Markdown);
                assert_eq!(args.chunk_size, 512);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ingest_requires_sources() {
        assert!(Cli::try_parse_from(["ragdeck", "ingest"]).is_err());
    }

    #[test]
    fn parses_ask_defaults() {
        let cli = Cli::try_parse_from(["ragdeck", "ask", "What is RAG?", "-k", "2"]).unwrap();
        assert_eq!(cli.embedder.embedder, EmbedderKind::Hash);
        match cli.command {
            Command::Ask(args) => {
                assert_eq!(args.question, "What is RAG?");
                assert_eq!(args.top_k, 2);
                assert_eq!(args.model, ModelKind::Extractive);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
