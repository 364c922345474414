//! Map/reduce contract shared by every summarization backend.
//!
//! A strategy turns one chunk into a short partial summary (`map`) and turns the joined
//! partial summaries into the final narrative (`reduce`). Strategies own prompt wording,
//! decoding settings, and cleanup of engine output; the orchestrator only sequences calls.

mod instruct;
mod remote;
mod seq2seq;

use async_trait::async_trait;

use super::types::{Chunk, StrategyError};

pub use instruct::{InstructStrategy, InstructTuning};
pub use remote::RemoteApiStrategy;
pub use seq2seq::{Seq2SeqSettings, Seq2SeqStrategy};

/// Returned by `reduce` when cleanup leaves nothing to show.
pub const EMPTY_SUMMARY_SENTINEL: &str = "Could not generate summary.";

/// Stand-in for a map output the engine left empty.
pub const EMPTY_MAP_PLACEHOLDER: &str = "(Empty response)";

/// Run-level facts a strategy may size its map output against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapContext {
    /// Number of chunks in the run, skipped ones included.
    pub total_chunks: usize,
}

/// Backend-specific implementation of the map and reduce phases.
#[async_trait]
pub trait SummaryStrategy: Send + Sync {
    /// Summarize one chunk. `Ok(None)` skips the chunk: it carries no summarizable content
    /// and contributes neither progress nor a partial summary. `Ok(Some(_))` is never empty.
    async fn map(
        &self,
        chunk: &Chunk,
        context: MapContext,
    ) -> Result<Option<String>, StrategyError>;

    /// Synthesize the final summary from the joined partial summaries. Never empty.
    async fn reduce(&self, combined: &str) -> Result<String, StrategyError>;
}

/// Per-chunk output budget that keeps the joined partial summaries inside the reduce
/// window: `clamp(safe_reduce_budget / chunk_count, lower, upper)`.
pub fn scaled_output_budget(
    lower: usize,
    upper: usize,
    safe_reduce_budget: usize,
    chunk_count: usize,
) -> usize {
    (safe_reduce_budget / chunk_count.max(1)).clamp(lower, upper.max(lower))
}

/// Remove every occurrence of each marker.
pub(crate) fn strip_markers(text: &str, markers: &[&str]) -> String {
    markers
        .iter()
        .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
}

/// Keep only the text before the first occurrence of any marker.
pub(crate) fn truncate_at_first<'a>(text: &'a str, markers: &[&str]) -> &'a str {
    let cut = markers
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    &text[..cut]
}

/// Trimmed `text`, or `fallback` when nothing is left.
pub(crate) fn non_empty_or(text: &str, fallback: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_budget_shrinks_as_chunk_count_grows() {
        assert_eq!(scaled_output_budget(100, 350, 3500, 1), 350);
        assert_eq!(scaled_output_budget(100, 350, 3500, 14), 250);
        assert_eq!(scaled_output_budget(100, 350, 3500, 100), 100);
        assert_eq!(scaled_output_budget(100, 350, 3500, 0), 350);
    }

    #[test]
    fn truncate_stops_at_earliest_marker() {
        let text = "Summary body [INST] next instruction ### echo";
        assert_eq!(
            truncate_at_first(text, &["### echo", "[INST]"]),
            "Summary body "
        );
        assert_eq!(truncate_at_first("clean", &["[INST]"]), "clean");
    }

    #[test]
    fn helpers_strip_markup_and_fill_empties() {
        assert_eq!(strip_markers("<pad> text</s>", &["<pad>", "</s>"]), " text");
        assert_eq!(
            non_empty_or("   ", EMPTY_SUMMARY_SENTINEL),
            EMPTY_SUMMARY_SENTINEL
        );
        assert_eq!(non_empty_or(" ok ", EMPTY_SUMMARY_SENTINEL), "ok");
    }
}
