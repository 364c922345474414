use async_trait::async_trait;
use std::sync::Arc;

use super::{
    EMPTY_MAP_PLACEHOLDER, EMPTY_SUMMARY_SENTINEL, MapContext, SummaryStrategy, non_empty_or,
    truncate_at_first,
};
use crate::generation::{GenerationRequest, TextGenerator};
use crate::processing::types::{Chunk, StrategyError};

const PARTIALS_HEADER: &str = "### Partial Summaries:";
const MAP_OUTPUT_TOKENS: usize = 1024;
const REDUCE_OUTPUT_TOKENS: usize = 2048;

/// Strategy for a hosted generative API with a large context window. Map and reduce may use
/// different models so the synthesis step can run on a stronger one.
pub struct RemoteApiStrategy {
    generator: Arc<dyn TextGenerator>,
    map_model: String,
    reduce_model: String,
}

impl RemoteApiStrategy {
    /// Use `map_model` per chunk and `reduce_model` for the final synthesis.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        map_model: impl Into<String>,
        reduce_model: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            map_model: map_model.into(),
            reduce_model: reduce_model.into(),
        }
    }
}

#[async_trait]
impl SummaryStrategy for RemoteApiStrategy {
    async fn map(
        &self,
        chunk: &Chunk,
        context: MapContext,
    ) -> Result<Option<String>, StrategyError> {
        tracing::debug!(
            model = %self.map_model,
            chunk = chunk.index(),
            total = context.total_chunks,
            "Remote map step"
        );
        let request = GenerationRequest::new(
            self.map_model.clone(),
            format!("Summarize:\n{}", chunk.text()),
            MAP_OUTPUT_TOKENS,
        );
        let summary = self.generator.generate(request).await?;
        Ok(Some(non_empty_or(&summary, EMPTY_MAP_PLACEHOLDER)))
    }

    async fn reduce(&self, combined: &str) -> Result<String, StrategyError> {
        tracing::debug!(model = %self.reduce_model, "Remote reduce step");
        let prompt = format!(
            "You are an expert editor. Synthesize these partial summaries into one cohesive summary:\n\n\
             {PARTIALS_HEADER}\n{combined}"
        );
        let request =
            GenerationRequest::new(self.reduce_model.clone(), prompt, REDUCE_OUTPUT_TOKENS);
        let raw = self.generator.generate(request).await?;
        Ok(non_empty_or(
            truncate_at_first(&raw, &[PARTIALS_HEADER]),
            EMPTY_SUMMARY_SENTINEL,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationError, testing::ScriptedGenerator};

    #[tokio::test]
    async fn map_and_reduce_use_their_own_models() {
        let generator = Arc::new(ScriptedGenerator::replying("Condensed."));
        let strategy = RemoteApiStrategy::new(generator.clone(), "flash", "pro");

        let chunk = Chunk::new(1, "Chapter one.".into(), 4);
        let mapped = strategy
            .map(&chunk, MapContext { total_chunks: 1 })
            .await
            .unwrap();
        assert_eq!(mapped.as_deref(), Some("Condensed."));
        let reduced = strategy.reduce("Condensed.").await.unwrap();
        assert_eq!(reduced, "Condensed.");

        let requests = generator.requests().await;
        assert_eq!(requests[0].model, "flash");
        assert_eq!(requests[0].prompt, "Summarize:\nChapter one.");
        assert_eq!(requests[1].model, "pro");
        let reduce_prompt = &requests[1].prompt;
        assert!(reduce_prompt.ends_with("### Partial Summaries:\nCondensed."));
    }

    #[tokio::test]
    async fn empty_map_reply_uses_placeholder() {
        let generator = Arc::new(ScriptedGenerator::replying("   "));
        let strategy = RemoteApiStrategy::new(generator, "flash", "pro");
        let chunk = Chunk::new(1, "Text.".into(), 2);
        let mapped = strategy
            .map(&chunk, MapContext { total_chunks: 1 })
            .await
            .unwrap();
        assert_eq!(mapped.as_deref(), Some(EMPTY_MAP_PLACEHOLDER));
    }

    #[tokio::test]
    async fn reduce_drops_echoed_prompt_and_propagates_errors() {
        let echo = Arc::new(ScriptedGenerator::replying(
            "Unified summary.\n### Partial Summaries:\nfirst",
        ));
        let strategy = RemoteApiStrategy::new(echo, "flash", "pro");
        assert_eq!(strategy.reduce("first").await.unwrap(), "Unified summary.");

        let failing = Arc::new(ScriptedGenerator::new(|_| {
            Err(GenerationError::GenerationFailed("quota".into()))
        }));
        let strategy = RemoteApiStrategy::new(failing, "flash", "pro");
        let error = strategy.reduce("first").await.expect_err("reduce error");
        assert!(error.to_string().contains("quota"));
    }
}
