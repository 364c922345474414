//! Paragraph-aware chunking under a per-backend token budget.
//!
//! Highlights:
//!
//! - Paragraphs (blank-line separated) are the unit of packing; they are joined with single
//!   spaces until the next one would push the chunk past `max_tokens`.
//! - Overlap: when a chunk closes, the next one is seeded with the last `overlap_tokens`
//!   tokens of the closed chunk so adjacent summaries share context. The seed shrinks when
//!   the following paragraph leaves no room for it.
//! - Oversized paragraphs are cut into token windows of `max_tokens`, `max_tokens -
//!   overlap_tokens` apart, and emitted after any buffered paragraphs so document order
//!   holds.
//! - Token counting is delegated to a [`TokenCodec`], exact or heuristic.

use regex::Regex;
use std::sync::LazyLock;

use super::codec::TokenCodec;
use super::types::{Chunk, CodecError, TokenBudget};

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n\s*\n").unwrap_or_else(|error| panic!("paragraph pattern is valid: {error}"))
});

/// Split `text` into ordered chunks that fit `budget` according to `codec`.
///
/// Returns an empty vector when the input is blank; callers treat that as "nothing to
/// summarize" rather than an error.
pub fn chunk_text(
    text: &str,
    budget: TokenBudget,
    codec: &dyn TokenCodec,
) -> Result<Vec<Chunk>, CodecError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = ChunkBuilder::new(budget, codec);
    for paragraph in split_paragraphs(text) {
        builder.push_paragraph(paragraph)?;
    }
    Ok(builder.finish())
}

/// Non-empty, trimmed paragraphs in document order.
pub(crate) fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
}

struct ChunkBuilder<'a> {
    budget: TokenBudget,
    codec: &'a dyn TokenCodec,
    chunks: Vec<Chunk>,
    buffer: Vec<String>,
}

impl<'a> ChunkBuilder<'a> {
    fn new(budget: TokenBudget, codec: &'a dyn TokenCodec) -> Self {
        Self {
            budget,
            codec,
            chunks: Vec::new(),
            buffer: Vec::new(),
        }
    }

    fn push_paragraph(&mut self, paragraph: &str) -> Result<(), CodecError> {
        let max_tokens = self.budget.max_tokens();
        let paragraph_tokens = self.codec.count(paragraph);

        if paragraph_tokens > max_tokens {
            self.flush();
            self.push_windows(paragraph)?;
            return Ok(());
        }

        if !self.buffer.is_empty() && self.codec.count(&self.joined_with(paragraph)) > max_tokens
        {
            if let Some(closed) = self.flush() {
                self.seed_overlap(&closed, paragraph, paragraph_tokens)?;
            }
        }

        self.buffer.push(paragraph.to_string());
        Ok(())
    }

    fn push_windows(&mut self, paragraph: &str) -> Result<(), CodecError> {
        let windows =
            self.codec
                .windows(paragraph, self.budget.max_tokens(), self.budget.stride())?;
        tracing::trace!(
            windows = windows.len(),
            codec = self.codec.name(),
            "Sliced oversized paragraph"
        );
        for window in windows {
            self.push_chunk(window);
        }
        Ok(())
    }

    /// Seed the empty buffer with the tail of `closed`, shrinking the seed until it fits in
    /// front of `next`.
    fn seed_overlap(
        &mut self,
        closed: &str,
        next: &str,
        next_tokens: usize,
    ) -> Result<(), CodecError> {
        let max_tokens = self.budget.max_tokens();
        let mut overlap = self
            .budget
            .overlap_tokens()
            .min(max_tokens.saturating_sub(next_tokens));

        while overlap > 0 {
            let seed = self.codec.tail(closed, overlap)?;
            if seed.is_empty() {
                break;
            }
            if self.codec.count(&format!("{seed} {next}")) <= max_tokens {
                self.buffer.push(seed);
                break;
            }
            overlap -= 1;
        }
        Ok(())
    }

    fn joined_with(&self, paragraph: &str) -> String {
        let mut joined = self.buffer.join(" ");
        joined.push(' ');
        joined.push_str(paragraph);
        joined
    }

    /// Close the buffer into a chunk, returning its text.
    fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.buffer).join(" ");
        self.push_chunk(text.clone());
        Some(text)
    }

    fn push_chunk(&mut self, text: String) {
        let token_count = self.codec.count(&text);
        let index = self.chunks.len() + 1;
        self.chunks.push(Chunk::new(index, text, token_count));
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}
