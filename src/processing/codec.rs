//! Token counting and token-position slicing.
//!
//! Chunking needs three capabilities from a tokenizer: count the tokens in a string, cut a
//! string into fixed-size token windows, and take the last `n` tokens of a string. The
//! [`TokenCodec`] trait exposes exactly those, with two implementations:
//!
//! - [`TiktokenCodec`]: exact counts from a BPE table loaded through `tiktoken-rs`. Windows
//!   are cut at token positions that fall on character boundaries and sliced from the
//!   source text.
//! - [`HeuristicCodec`]: for engines with no tokenizer access. Assumes a fixed three
//!   characters per token and cuts on character positions.
//!
//! The codec is chosen once per backend; the chunker never branches on which one it holds.

use anyhow::Error as TokenizerError;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::CodecError;

/// Characters assumed per token by the heuristic codec.
pub const CHARS_PER_TOKEN: usize = 3;

/// Capability interface over a backend's tokenizer (or an estimate of it).
pub trait TokenCodec: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Whether counts come from the backend's real tokenizer.
    fn is_exact(&self) -> bool;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// Cut `text` into windows of at most `size` tokens whose starts are `stride` tokens
    /// apart. Stops at the first window that reaches the end of the text.
    fn windows(&self, text: &str, size: usize, stride: usize) -> Result<Vec<String>, CodecError>;

    /// The trailing `tokens` tokens of `text`, with leading whitespace removed.
    fn tail(&self, text: &str, tokens: usize) -> Result<String, CodecError>;

    /// The leading `tokens` tokens of `text`, with trailing whitespace removed.
    fn head(&self, text: &str, tokens: usize) -> Result<String, CodecError>;
}

/// Window start offsets over a sequence of `len` units.
fn window_bounds(len: usize, size: usize, stride: usize) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    if len == 0 || size == 0 {
        return bounds;
    }
    let stride = stride.max(1);
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        bounds.push((start, end));
        if end == len {
            break;
        }
        start += stride;
    }
    bounds
}

/// Exact codec backed by a `tiktoken` BPE table.
pub struct TiktokenCodec {
    encoding: String,
    bpe: CoreBPE,
}

impl TiktokenCodec {
    /// Load an encoding by model name or encoding name (`r50k_base`, `cl100k_base`, ...).
    pub fn from_encoding(name: &str) -> Result<Self, CodecError> {
        let normalized = name.trim();
        let target = if normalized.is_empty() {
            "cl100k_base"
        } else {
            normalized
        };
        let bpe = resolve_encoding(target).map_err(|source| CodecError::Tokenizer {
            encoding: target.to_string(),
            source,
        })?;
        Ok(Self {
            encoding: target.to_string(),
            bpe,
        })
    }

    /// Byte offset in `text` where each token starts, plus `text.len()`.
    fn token_offsets(&self, text: &str) -> Result<Vec<usize>, CodecError> {
        let ids = self.bpe.encode_ordinary(text);
        let mut offsets = Vec::with_capacity(ids.len() + 1);
        let mut position = 0;
        offsets.push(position);
        for bytes in self.bpe._decode_native_and_split(ids) {
            position += bytes.len();
            offsets.push(position);
        }
        if position != text.len() {
            return Err(CodecError::Decode(format!(
                "token bytes cover {position} of {} input bytes",
                text.len()
            )));
        }
        Ok(offsets)
    }
}

/// Token positions whose byte offset falls on a UTF-8 character boundary.
///
/// A multibyte character split across several tokens only admits cuts before its first
/// token and after its last, so slices taken between these positions are always valid.
fn cut_points(text: &str, offsets: &[usize]) -> Vec<usize> {
    offsets
        .iter()
        .enumerate()
        .filter(|(_, offset)| text.is_char_boundary(**offset))
        .map(|(position, _)| position)
        .collect()
}

/// Greatest cut point `<= limit`, if one lies strictly after `after`.
fn cut_at_or_before(cuts: &[usize], after: usize, limit: usize) -> Option<usize> {
    let index = cuts.partition_point(|&cut| cut <= limit);
    cuts[..index].last().copied().filter(|&cut| cut > after)
}

/// Smallest cut point strictly after `after`.
fn cut_after(cuts: &[usize], after: usize) -> Option<usize> {
    let index = cuts.partition_point(|&cut| cut <= after);
    cuts.get(index).copied()
}

impl TokenCodec for TiktokenCodec {
    fn name(&self) -> &str {
        &self.encoding
    }

    fn is_exact(&self) -> bool {
        true
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn windows(&self, text: &str, size: usize, stride: usize) -> Result<Vec<String>, CodecError> {
        let offsets = self.token_offsets(text)?;
        let len = offsets.len() - 1;
        let mut windows = Vec::new();
        if len == 0 || size == 0 {
            return Ok(windows);
        }
        let cuts = cut_points(text, &offsets);
        let stride = stride.clamp(1, size);

        // Each window ends on the last cut inside its token budget; the next one starts on
        // the last cut inside the stride, so stride == size leaves neither gap nor repeat.
        let mut start = 0;
        loop {
            let end = cut_at_or_before(&cuts, start, start + size)
                .or_else(|| cut_after(&cuts, start))
                .unwrap_or(len);
            let slice = &text[offsets[start]..offsets[end]];
            let trimmed = slice.trim();
            if !trimmed.is_empty() {
                // Stripping a leading space can split the first word into more tokens.
                if self.count(trimmed) <= size {
                    windows.push(trimmed.to_string());
                } else {
                    windows.push(slice.to_string());
                }
            }
            if end == len {
                break;
            }
            start = cut_at_or_before(&cuts, start, start + stride).unwrap_or(end);
        }
        Ok(windows)
    }

    fn tail(&self, text: &str, tokens: usize) -> Result<String, CodecError> {
        if tokens == 0 {
            return Ok(String::new());
        }
        let offsets = self.token_offsets(text)?;
        let len = offsets.len() - 1;
        let first = len.saturating_sub(tokens);
        let start = offsets[first..]
            .iter()
            .copied()
            .find(|offset| text.is_char_boundary(*offset))
            .unwrap_or(text.len());
        Ok(text[start..].trim_start().to_string())
    }

    fn head(&self, text: &str, tokens: usize) -> Result<String, CodecError> {
        let offsets = self.token_offsets(text)?;
        if offsets.len() - 1 <= tokens {
            return Ok(text.trim_end().to_string());
        }
        let end = offsets[..=tokens]
            .iter()
            .rev()
            .copied()
            .find(|offset| text.is_char_boundary(*offset))
            .unwrap_or(0);
        Ok(text[..end].trim_end().to_string())
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

/// Estimating codec for engines that expose no tokenizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCodec;

impl HeuristicCodec {
    /// Byte offset of every character start, plus the string length.
    fn char_offsets(text: &str) -> Vec<usize> {
        text.char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect()
    }
}

impl TokenCodec for HeuristicCodec {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    fn windows(&self, text: &str, size: usize, stride: usize) -> Result<Vec<String>, CodecError> {
        let offsets = Self::char_offsets(text);
        let char_len = offsets.len() - 1;
        let bounds = window_bounds(char_len, size * CHARS_PER_TOKEN, stride * CHARS_PER_TOKEN);
        let windows = bounds
            .into_iter()
            .map(|(start, end)| text[offsets[start]..offsets[end]].trim().to_string())
            .filter(|window| !window.is_empty())
            .collect();
        Ok(windows)
    }

    fn tail(&self, text: &str, tokens: usize) -> Result<String, CodecError> {
        let offsets = Self::char_offsets(text);
        let char_len = offsets.len() - 1;
        let start = char_len.saturating_sub(tokens * CHARS_PER_TOKEN);
        Ok(text[offsets[start]..].trim_start().to_string())
    }

    fn head(&self, text: &str, tokens: usize) -> Result<String, CodecError> {
        let offsets = Self::char_offsets(text);
        let end = (tokens * CHARS_PER_TOKEN).min(offsets.len() - 1);
        Ok(text[..offsets[end]].trim_end().to_string())
    }
}
