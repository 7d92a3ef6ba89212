//! Document splitting strategies.
//!
//! This module provides the [`Chunker`] trait and four implementations:
//!
//! - [`FixedSizeChunker`]: windows of at most `chunk_size` characters with a fixed overlap
//! - [`WordChunker`]: windows of at most `chunk_size` words with a fixed overlap
//! - [`RecursiveChunker`]: splits hierarchically by paragraphs, sentences, then words
//! - [`MarkdownChunker`]: splits by markdown headers, preserving header context
//!
//! Windows advance by `chunk_size - chunk_overlap` units and stop as soon as a
//! window reaches the end of the text, so the tail is never emitted as a chunk
//! made only of overlap.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Lazily split a document into chunks, in document order.
    ///
    /// Yields nothing if the document has empty text.
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a>;

    /// Split a document into chunks, collecting them into a `Vec`.
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.chunks(document).collect()
    }
}

/// Check that a size/overlap pair describes a usable window.
fn validate_window(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::SplitError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::SplitError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Clamp a size/overlap pair into a usable window.
fn clamp_window(chunk_size: usize, chunk_overlap: usize) -> (usize, usize) {
    let size = chunk_size.max(1);
    (size, chunk_overlap.min(size - 1))
}

/// Build a chunk inheriting the document's metadata.
fn make_chunk(document: &Document, index: usize, text: String) -> Chunk {
    let mut metadata = document.metadata.clone();
    metadata.insert("chunk_index".to_string(), index.to_string());
    Chunk {
        id: format!("{}_{index}", document.id),
        text,
        embedding: Vec::new(),
        metadata,
        document_id: document.id.clone(),
    }
}

/// Byte offset reached after advancing `chars` characters from `start`.
fn advance_chars(text: &str, start: usize, chars: usize) -> usize {
    text[start..].char_indices().nth(chars).map(|(i, _)| start + i).unwrap_or(text.len())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text into windows of at most `chunk_size` characters.
///
/// Consecutive windows share exactly `chunk_overlap` characters. Chunk IDs are
/// generated as `{document_id}_{chunk_index}`. Each chunk inherits the parent
/// document's metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::try_new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`, clamping `chunk_overlap` below `chunk_size`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let (chunk_size, chunk_overlap) = clamp_window(chunk_size, chunk_overlap);
        Self { chunk_size, chunk_overlap }
    }

    /// Create a new `FixedSizeChunker`, rejecting inconsistent parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SplitError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn try_new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// The configured overlap, in characters.
    pub fn overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Iterate over the chunks of `document` without collecting them.
    pub fn iter<'a>(&self, document: &'a Document) -> FixedSizeChunks<'a> {
        FixedSizeChunks {
            document,
            size: self.chunk_size,
            step: self.chunk_size - self.chunk_overlap,
            start: if document.text.is_empty() { None } else { Some(0) },
            index: 0,
        }
    }
}

/// Lazy iterator returned by [`FixedSizeChunker::iter`].
#[derive(Debug, Clone)]
pub struct FixedSizeChunks<'a> {
    document: &'a Document,
    size: usize,
    step: usize,
    /// Byte offset of the next window, `None` once the end was reached.
    start: Option<usize>,
    index: usize,
}

impl Iterator for FixedSizeChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.start?;
        let text = &self.document.text;
        let end = advance_chars(text, start, self.size);

        self.start = if end >= text.len() { None } else { Some(advance_chars(text, start, self.step)) };

        let chunk = make_chunk(self.document, self.index, text[start..end].to_string());
        self.index += 1;
        Some(chunk)
    }
}

impl Chunker for FixedSizeChunker {
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        Box::new(self.iter(document))
    }
}

/// Splits text into windows of at most `chunk_size` whitespace-separated words.
///
/// Words inside a chunk are joined with a single space, so runs of whitespace
/// in the source are normalized. Consecutive windows share exactly
/// `chunk_overlap` words.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::WordChunker;
///
/// let chunker = WordChunker::try_new(3, 1)?;
/// // "A B C D E F" → ["A B C", "C D E", "E F"]
/// ```
#[derive(Debug, Clone)]
pub struct WordChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl WordChunker {
    /// Create a new `WordChunker`, clamping `chunk_overlap` below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let (chunk_size, chunk_overlap) = clamp_window(chunk_size, chunk_overlap);
        Self { chunk_size, chunk_overlap }
    }

    /// Create a new `WordChunker`, rejecting inconsistent parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SplitError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn try_new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// The configured overlap, in words.
    pub fn overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Iterate over the chunks of `document` without collecting them.
    pub fn iter<'a>(&self, document: &'a Document) -> WordChunks<'a> {
        let words: Vec<&'a str> = document.text.split_whitespace().collect();
        WordChunks {
            document,
            start: if words.is_empty() { None } else { Some(0) },
            words,
            size: self.chunk_size,
            step: self.chunk_size - self.chunk_overlap,
            index: 0,
        }
    }
}

/// Lazy iterator returned by [`WordChunker::iter`].
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    document: &'a Document,
    words: Vec<&'a str>,
    size: usize,
    step: usize,
    start: Option<usize>,
    index: usize,
}

impl Iterator for WordChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.start?;
        let end = (start + self.size).min(self.words.len());

        self.start = if end >= self.words.len() { None } else { Some(start + self.step) };

        let chunk = make_chunk(self.document, self.index, self.words[start..end].join(" "));
        self.index += 1;
        Some(chunk)
    }
}

impl Chunker for WordChunker {
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        Box::new(self.iter(document))
    }
}

/// Rebuild the text of consecutive [`FixedSizeChunker`] chunks by dropping the
/// first `overlap` characters of every chunk after the first.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}

/// Rebuild the word sequence of consecutive [`WordChunker`] chunks by dropping
/// the first `overlap` words of every chunk after the first.
pub fn reassemble_words(chunks: &[Chunk], overlap: usize) -> String {
    let mut words: Vec<&str> = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap };
        words.extend(chunk.text.split_whitespace().skip(skip));
    }
    words.join(" ")
}

/// Splits text hierarchically: paragraphs → sentences → words.
///
/// First splits by paragraph separators (`\n\n`). If a paragraph exceeds
/// `chunk_size` characters, splits by sentence boundaries (`. `, `! `, `? `).
/// If a sentence still exceeds `chunk_size`, splits by word boundaries, and
/// finally by characters. When a chunk is closed, up to `chunk_overlap`
/// trailing characters (trimmed to a word boundary) are carried into the next
/// one.
///
/// # Example
///
/// ```rust,ignore
/// use ragdeck::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(512, 100);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

const SEPARATORS: [&str; 5] = ["\n\n", ". ", "! ", "? ", " "];

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`, clamping `chunk_overlap` below `chunk_size`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let (chunk_size, chunk_overlap) = clamp_window(chunk_size, chunk_overlap);
        Self { chunk_size, chunk_overlap }
    }

    /// Create a new `RecursiveChunker`, rejecting inconsistent parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SplitError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn try_new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

/// The last `overlap` characters of `text`, starting at a word boundary when
/// one is available.
fn overlap_tail(text: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= overlap {
        return text;
    }
    let start = advance_chars(text, 0, total - overlap);
    let tail = &text[start..];
    if text[..start].ends_with(char::is_whitespace) {
        return tail;
    }
    // Starts mid-word: drop the partial word.
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => "",
    }
}

/// Split text by a separator, then merge segments into chunks that respect
/// `chunk_size`. If a segment exceeds `chunk_size`, it is split further
/// using the next-level separator.
fn split_and_merge(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }
    let Some((&separator, remaining_separators)) = separators.split_first() else {
        return split_by_size(text, chunk_size, chunk_overlap);
    };

    let mut chunks = Vec::new();
    let mut current = String::new();

    let flush = |current: &str, chunks: &mut Vec<String>| {
        if char_len(current) > chunk_size {
            chunks.extend(split_and_merge(current, chunk_size, chunk_overlap, remaining_separators));
        } else {
            chunks.push(current.to_string());
        }
    };

    for segment in split_keeping_separator(text, separator) {
        if current.is_empty() {
            current = segment.to_string();
        } else if char_len(&current) + char_len(segment) <= chunk_size {
            current.push_str(segment);
        } else {
            flush(&current, &mut chunks);
            let tail = overlap_tail(&current, chunk_overlap);
            current = if char_len(tail) + char_len(segment) <= chunk_size {
                format!("{tail}{segment}")
            } else {
                segment.to_string()
            };
        }
    }

    if !current.is_empty() {
        flush(&current, &mut chunks);
    }

    chunks
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-based splitting with overlap.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let (size, overlap) = clamp_window(chunk_size, chunk_overlap);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = advance_chars(text, start, size);
        chunks.push(text[start..end].to_string());
        if end >= text.len() {
            break;
        }
        start = advance_chars(text, start, size - overlap);
    }

    chunks
}

/// Trim raw pieces and attach chunk metadata, dropping whitespace-only pieces.
fn into_chunks(document: &Document, pieces: Vec<String>) -> Vec<Chunk> {
    pieces
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(i, piece)| make_chunk(document, i, piece.to_string()))
        .collect()
}

impl Chunker for RecursiveChunker {
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        if document.text.trim().is_empty() {
            return Box::new(std::iter::empty());
        }

        let pieces =
            split_and_merge(&document.text, self.chunk_size, self.chunk_overlap, &SEPARATORS);
        Box::new(into_chunks(document, pieces).into_iter())
    }
}

/// Splits text by markdown headers, keeping each section as a chunk.
///
/// Each section is prefixed with its header hierarchy. Sections exceeding
/// `chunk_size` are further split using [`RecursiveChunker`] logic.
/// The `header_path` metadata field records the header hierarchy for each chunk.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl MarkdownChunker {
    /// Create a new `MarkdownChunker`, clamping `chunk_overlap` below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let (chunk_size, chunk_overlap) = clamp_window(chunk_size, chunk_overlap);
        Self { chunk_size, chunk_overlap }
    }

    /// Create a new `MarkdownChunker`, rejecting inconsistent parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SplitError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn try_new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

/// A markdown section with its header hierarchy and body text.
struct MarkdownSection {
    header_path: String,
    text: String,
}

/// Parse markdown text into sections split by headers.
fn parse_markdown_sections(text: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut current_body = String::new();
    let mut current_header_path = String::new();
    let mut in_code_block = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
        }

        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let is_header = !in_code_block
            && (1..=6).contains(&level)
            && trimmed[level..].starts_with(char::is_whitespace);

        if is_header {
            if !current_body.trim().is_empty() || !current_header_path.is_empty() {
                sections.push(MarkdownSection {
                    header_path: current_header_path.clone(),
                    text: current_body.trim().to_string(),
                });
            }
            current_body.clear();

            headers.truncate(level - 1);
            headers.push(trimmed[level..].trim().to_string());
            current_header_path = headers.join(" > ");
        } else {
            if !current_body.is_empty() {
                current_body.push('\n');
            }
            current_body.push_str(line);
        }
    }

    if !current_body.trim().is_empty() || !current_header_path.is_empty() {
        sections.push(MarkdownSection {
            header_path: current_header_path,
            text: current_body.trim().to_string(),
        });
    }

    sections
}

impl MarkdownChunker {
    fn split_sections(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_index = 0;

        for section in parse_markdown_sections(&document.text) {
            let section_text = match (section.header_path.is_empty(), section.text.is_empty()) {
                (true, _) => section.text.clone(),
                (false, true) => section.header_path.clone(),
                (false, false) => format!("{}\n{}", section.header_path, section.text),
            };

            if section_text.is_empty() {
                continue;
            }

            for text in split_and_merge(&section_text, self.chunk_size, self.chunk_overlap, &SEPARATORS)
            {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let mut chunk = make_chunk(document, chunk_index, text.to_string());
                chunk.metadata.insert("header_path".to_string(), section.header_path.clone());
                chunks.push(chunk);
                chunk_index += 1;
            }
        }

        chunks
    }
}

impl Chunker for MarkdownChunker {
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        if document.text.trim().is_empty() {
            return Box::new(std::iter::empty());
        }
        Box::new(self.split_sections(document).into_iter())
    }
}
