use async_trait::async_trait;
use std::sync::Arc;

use super::{
    EMPTY_SUMMARY_SENTINEL, MapContext, SummaryStrategy, non_empty_or, scaled_output_budget,
    strip_markers, truncate_at_first,
};
use crate::generation::{GenerationRequest, TextGenerator};
use crate::processing::types::{Chunk, StrategyError};

const INST_OPEN: &str = "[INST]";
const INST_CLOSE: &str = "[/INST]";
const KEY_POINTS_LEAD: &str = "Key Points:";
const SUMMARY_LEAD: &str = "Summary:";

/// Tuning for instruction-tuned causal models with a small context window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstructTuning {
    /// Floor for the per-chunk output budget.
    pub min_map_tokens: usize,
    /// Ceiling for the per-chunk output budget.
    pub max_map_tokens: usize,
    /// Token volume the joined partial summaries may occupy in the reduce prompt.
    pub safe_reduce_budget: usize,
    /// Output budget for the final summary.
    pub reduce_tokens: usize,
    /// Chunks shorter than this (in characters, after flattening) are skipped.
    pub min_chunk_chars: usize,
    /// Penalty applied to repeated tokens.
    pub repetition_penalty: f32,
}

impl Default for InstructTuning {
    fn default() -> Self {
        Self {
            min_map_tokens: 100,
            max_map_tokens: 350,
            safe_reduce_budget: 3500,
            reduce_tokens: 800,
            min_chunk_chars: 30,
            repetition_penalty: 1.15,
        }
    }
}

/// Strategy for a local quantized instruction model prompted with `[INST]` delimiters.
pub struct InstructStrategy {
    generator: Arc<dyn TextGenerator>,
    model: String,
    tuning: InstructTuning,
}

impl InstructStrategy {
    /// Drive `model` through `generator`.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
        tuning: InstructTuning,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            tuning,
        }
    }

    fn map_prompt(text: &str) -> String {
        format!(
            "{INST_OPEN} Analyze the text below and extract the key information. \
             Focus on capturing main ideas. Output a concise list of bullet points. \
             Text: {text} {INST_CLOSE}\n{KEY_POINTS_LEAD}"
        )
    }

    fn reduce_prompt(notes: &str) -> String {
        format!(
            "{INST_OPEN} You are a professional editor. \
             Synthesize the notes below into a single, coherent narrative summary. \
             --- NOTES ---\n{notes}\n--- END NOTES ---\n{INST_CLOSE}\n{SUMMARY_LEAD}"
        )
    }

    /// Text after the answer lead (or the closing delimiter), cut before any new instruction.
    fn extract_final(raw: &str) -> &str {
        let answer = match raw.rsplit_once(SUMMARY_LEAD) {
            Some((_, after)) => after,
            None => raw.rsplit_once(INST_CLOSE).map_or(raw, |(_, after)| after),
        };
        truncate_at_first(answer, &[INST_OPEN])
    }
}

#[async_trait]
impl SummaryStrategy for InstructStrategy {
    async fn map(
        &self,
        chunk: &Chunk,
        context: MapContext,
    ) -> Result<Option<String>, StrategyError> {
        let flattened = chunk.text().replace('\n', " ");
        let clean = flattened.trim();
        if clean.chars().count() < self.tuning.min_chunk_chars {
            tracing::debug!(
                chunk = chunk.index(),
                "Skipping chunk with too little content"
            );
            return Ok(None);
        }

        let max_new_tokens = scaled_output_budget(
            self.tuning.min_map_tokens,
            self.tuning.max_map_tokens,
            self.tuning.safe_reduce_budget,
            context.total_chunks,
        );
        tracing::debug!(
            model = %self.model,
            chunk = chunk.index(),
            total = context.total_chunks,
            max_new_tokens,
            "Instruct map step"
        );

        let prompt = Self::map_prompt(clean);
        let request = GenerationRequest::new(self.model.clone(), prompt, max_new_tokens)
            .with_repetition_penalty(self.tuning.repetition_penalty);
        let raw = self.generator.generate(request).await?;
        let summary = strip_markers(&raw, &[INST_CLOSE, KEY_POINTS_LEAD]);
        Ok(Some(non_empty_or(&summary, clean)))
    }

    async fn reduce(&self, combined: &str) -> Result<String, StrategyError> {
        tracing::debug!(model = %self.model, "Instruct reduce step");
        let notes = strip_markers(combined, &[INST_OPEN, INST_CLOSE]);
        let request = GenerationRequest::new(
            self.model.clone(),
            Self::reduce_prompt(&notes),
            self.tuning.reduce_tokens,
        )
        .with_repetition_penalty(self.tuning.repetition_penalty);
        let raw = self.generator.generate(request).await?;
        Ok(non_empty_or(Self::extract_final(&raw), EMPTY_SUMMARY_SENTINEL))
    }
}
