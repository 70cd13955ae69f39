//! Keyword index: an in-memory lexical retriever.
//!
//! Documents are split into chunks of at most [`DEFAULT_CHUNK_CHARS`]
//! characters on paragraph and sentence boundaries. A query is scored against
//! each chunk by counting occurrences of the query's terms, normalised by the
//! square root of the chunk's term count. Han, kana, and hangul characters are
//! treated as one term each so text without spaces still matches.

use async_trait::async_trait;
use ctxweave_core::error::RetrievalError;
use ctxweave_core::retrieval::{Document, RetrievedDocument, Retriever};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// Maximum characters per chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 1024;

struct Chunk {
    content: String,
    metadata: BTreeMap<String, String>,
    term_freq: HashMap<String, usize>,
    term_count: usize,
}

impl Chunk {
    fn new(content: String, metadata: BTreeMap<String, String>) -> Self {
        let terms = tokenize(&content);
        let term_count = terms.len();
        let mut term_freq = HashMap::new();
        for term in terms {
            *term_freq.entry(term).or_insert(0) += 1;
        }
        Self {
            content,
            metadata,
            term_freq,
            term_count,
        }
    }

    fn score(&self, query_terms: &HashSet<String>) -> f32 {
        let hits: usize = query_terms
            .iter()
            .filter_map(|t| self.term_freq.get(t))
            .sum();
        if hits == 0 {
            return 0.0;
        }
        hits as f32 / (self.term_count as f32).sqrt().max(1.0)
    }
}

/// In-memory keyword retriever.
pub struct KeywordIndex {
    chunks: RwLock<Vec<Chunk>>,
    max_chunk_chars: usize,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_CHARS)
    }

    pub fn with_chunk_size(max_chunk_chars: usize) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for KeywordIndex {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn ingest(&self, documents: Vec<Document>) -> Result<usize, RetrievalError> {
        // Chunk everything before taking the lock so the corpus changes in one step.
        let mut staged = Vec::new();
        for doc in documents {
            for piece in chunk_text(&doc.content, self.max_chunk_chars) {
                staged.push(Chunk::new(piece, doc.metadata.clone()));
            }
        }

        let added = staged.len();
        let mut chunks = self.chunks.write().await;
        chunks.extend(staged);
        debug!(added, total = chunks.len(), "Indexed chunks");
        Ok(added)
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut scored: Vec<(f32, &Chunk)> = chunks
            .iter()
            .map(|c| (c.score(&query_terms), c))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Stable sort: equal scores keep ingestion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, c)| RetrievedDocument {
                content: c.content.clone(),
                metadata: c.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> usize {
        self.chunks.read().await.len()
    }
}

fn is_ideographic(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Lowercased terms of `text`.
fn tokenize(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_ideographic(c) {
            if !word.is_empty() {
                terms.push(std::mem::take(&mut word));
            }
            terms.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            terms.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        terms.push(word);
    }
    terms
}

/// Accumulates pieces into chunks no longer than `max` characters.
struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// `piece` must be at most `max` characters.
    fn push(&mut self, piece: &str, separator: &str) {
        let len = piece.chars().count();
        let sep_len = separator.chars().count();
        if !self.current.is_empty() && self.current_len + sep_len + len > self.max {
            self.flush();
        }
        if !self.current.is_empty() {
            self.current.push_str(separator);
            self.current_len += sep_len;
        }
        self.current.push_str(piece);
        self.current_len += len;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed together while they fit. A
/// paragraph that is too long on its own is split into sentences, and a
/// sentence that is still too long is cut at the character limit.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let text = text.replace("\r\n", "\n");
    let mut packer = Packer::new(max_chars);

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() <= max_chars {
            packer.push(paragraph, "\n\n");
            continue;
        }
        let mut separator = "\n\n";
        for sentence in split_sentences(paragraph) {
            for piece in hard_split(sentence, max_chars) {
                packer.push(&piece, separator);
                separator = " ";
            }
        }
    }

    packer.finish()
}

fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '。' | '！' | '？' => true,
            '.' | '!' | '?' => chars.peek().is_none_or(|(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            sentences.push(paragraph[start..end].trim());
            start = end;
        }
    }
    sentences.push(paragraph[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}
