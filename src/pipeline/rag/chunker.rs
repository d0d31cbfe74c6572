use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::types::KbDocument;

/// Approximate tokens per whitespace-separated word.
pub const TOKENS_PER_WORD: f64 = 1.3;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 100;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+|\n[0-9]+\.\s+").unwrap());
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    #[default]
    Paragraphs,
    Sentences,
    Fixed,
}

impl ChunkStrategy {
    /// Unknown names fall back to paragraphs.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "paragraphs" => ChunkStrategy::Paragraphs,
            "sentences" => ChunkStrategy::Sentences,
            "fixed" => ChunkStrategy::Fixed,
            other => {
                tracing::warn!(strategy = other, "Unknown chunking strategy, defaulting to paragraphs");
                ChunkStrategy::Paragraphs
            }
        }
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * TOKENS_PER_WORD) as usize
}

/// Splits knowledge documents into overlapping chunks sized in
/// estimated tokens.
pub struct DocumentChunker {
    chunk_size: usize,
    overlap: usize,
}

impl DocumentChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn chunk(&self, doc: &KbDocument, strategy: ChunkStrategy) -> Vec<KbDocument> {
        let texts = match strategy {
            ChunkStrategy::Paragraphs => self.by_paragraphs(&doc.text),
            ChunkStrategy::Sentences => self.by_sentences(&doc.text),
            ChunkStrategy::Fixed => self.fixed_size(&doc.text),
        };

        let prefix = if doc.id.is_empty() { "doc" } else { doc.id.as_str() };
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let index = i + 1;
                let mut metadata = doc.metadata.clone();
                metadata.insert("chunk_index".into(), Value::from(index));
                metadata.insert("tokens".into(), Value::from(estimate_tokens(&text)));
                KbDocument::new(format!("{prefix}_chunk_{index}"), text, metadata)
            })
            .collect()
    }

    pub fn chunk_all(&self, docs: &[KbDocument], strategy: ChunkStrategy) -> Vec<KbDocument> {
        let chunks: Vec<KbDocument> = docs
            .iter()
            .filter(|d| !d.text.is_empty())
            .flat_map(|d| self.chunk(d, strategy))
            .collect();
        tracing::info!(documents = docs.len(), chunks = chunks.len(), "Chunked documents");
        chunks
    }

    fn by_paragraphs(&self, text: &str) -> Vec<String> {
        let overlap_chars = self.chunk_size / 5;
        let mut chunks = Vec::new();
        let mut current = String::new();

        for para in PARAGRAPH_BREAK.split(text).map(str::trim).filter(|p| !p.is_empty()) {
            if estimate_tokens(&current) + estimate_tokens(para) > self.chunk_size
                && !current.is_empty()
            {
                chunks.push(current.trim().to_string());
                current = tail_chars(&current, overlap_chars).to_string();
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(para);
        }

        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        chunks
    }

    fn by_sentences(&self, text: &str) -> Vec<String> {
        let sentences = split_sentences(text);
        let mut chunks = Vec::new();
        let mut current = String::new();

        for (i, sentence) in sentences.iter().enumerate() {
            if estimate_tokens(&current) + estimate_tokens(sentence) > self.chunk_size
                && !current.is_empty()
            {
                chunks.push(current.trim().to_string());

                // Carry trailing sentences that fit the overlap budget.
                let mut carried: Vec<&str> = Vec::new();
                let mut budget = 0;
                for prev in sentences[..i].iter().rev() {
                    let tokens = estimate_tokens(prev);
                    if budget + tokens > self.overlap {
                        break;
                    }
                    carried.insert(0, prev);
                    budget += tokens;
                }
                current = carried.join(" ");
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }

        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        chunks
    }

    fn fixed_size(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let window = ((self.chunk_size as f64 / TOKENS_PER_WORD) as usize).max(1);
        let overlap = (self.overlap as f64 / TOKENS_PER_WORD) as usize;
        let step = window.saturating_sub(overlap).max(1);

        (0..words.len())
            .step_by(step)
            .map(|start| words[start..(start + window).min(words.len())].join(" "))
            .collect()
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    sentences.push(&text[start..]);
    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
