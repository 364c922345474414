use async_trait::async_trait;
use std::sync::Arc;

use super::{
    EMPTY_MAP_PLACEHOLDER, EMPTY_SUMMARY_SENTINEL, MapContext, SummaryStrategy, non_empty_or,
    strip_markers,
};
use crate::config::Config;
use crate::generation::{GenerationRequest, TextGenerator};
use crate::processing::codec::TokenCodec;
use crate::processing::types::{Chunk, StrategyError};

/// Special tokens seq2seq decoders leak when special-token skipping is off.
const SPECIAL_TOKENS: [&str; 4] = ["<pad>", "</s>", "<s>", "<unk>"];

/// Decoding settings for one seq2seq model.
#[derive(Debug, Clone, PartialEq)]
pub struct Seq2SeqSettings {
    /// Model identifier on the inference endpoint.
    pub model: String,
    /// Task prefix the model was trained with, if any.
    pub prompt_prefix: Option<&'static str>,
    /// Maximum summary length in tokens.
    pub max_length: usize,
    /// Minimum summary length in tokens.
    pub min_length: usize,
    /// Beam count.
    pub num_beams: u32,
    /// Beam-search length penalty.
    pub length_penalty: Option<f32>,
    /// Encoder window; longer prompts are cut to their leading tokens.
    pub max_input_tokens: usize,
}

impl Seq2SeqSettings {
    /// Small T5: needs the `summarize: ` task prefix.
    pub fn t5_small(config: &Config) -> Self {
        Self {
            model: "google-t5/t5-small".into(),
            prompt_prefix: Some("summarize: "),
            max_length: config.summary_max_length,
            min_length: config.summary_min_length,
            num_beams: 4,
            length_penalty: None,
            max_input_tokens: 512,
        }
    }

    /// BART fine-tuned on CNN/DailyMail; favors slightly longer outputs.
    pub fn bart_large_cnn(config: &Config) -> Self {
        Self {
            model: "facebook/bart-large-cnn".into(),
            prompt_prefix: None,
            max_length: config.summary_max_length,
            min_length: config.summary_min_length,
            num_beams: 4,
            length_penalty: Some(2.0),
            max_input_tokens: 1024,
        }
    }
}

/// Strategy for encoder-decoder summarization models. Map and reduce run the same model
/// with the same settings; reduce simply sees the joined partial summaries as its input.
pub struct Seq2SeqStrategy {
    generator: Arc<dyn TextGenerator>,
    codec: Arc<dyn TokenCodec>,
    settings: Seq2SeqSettings,
}

impl Seq2SeqStrategy {
    /// Drive `generator` with `settings`, measuring prompts with `codec`.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        codec: Arc<dyn TokenCodec>,
        settings: Seq2SeqSettings,
    ) -> Self {
        Self {
            generator,
            codec,
            settings,
        }
    }

    /// Prefix `text` and cut it to the encoder window.
    fn prompt(&self, text: &str) -> Result<String, StrategyError> {
        let prompt = match self.settings.prompt_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };
        let limit = self.settings.max_input_tokens;
        let tokens = self.codec.count(&prompt);
        if tokens <= limit {
            return Ok(prompt);
        }
        tracing::debug!(
            model = %self.settings.model,
            tokens,
            limit,
            "Truncating seq2seq input to encoder window"
        );
        Ok(self.codec.head(&prompt, limit)?)
    }

    async fn summarize(&self, text: &str) -> Result<String, StrategyError> {
        let prompt = self.prompt(text)?;
        let mut request = GenerationRequest::new(
            self.settings.model.clone(),
            prompt,
            self.settings.max_length,
        )
        .with_min_new_tokens(self.settings.min_length)
        .with_beams(self.settings.num_beams);
        if let Some(penalty) = self.settings.length_penalty {
            request = request.with_length_penalty(penalty);
        }
        let raw = self.generator.generate(request).await?;
        Ok(strip_markers(&raw, &SPECIAL_TOKENS))
    }
}

#[async_trait]
impl SummaryStrategy for Seq2SeqStrategy {
    async fn map(
        &self,
        chunk: &Chunk,
        context: MapContext,
    ) -> Result<Option<String>, StrategyError> {
        tracing::debug!(
            model = %self.settings.model,
            chunk = chunk.index(),
            total = context.total_chunks,
            "Seq2seq map step"
        );
        let summary = self.summarize(chunk.text()).await?;
        Ok(Some(non_empty_or(&summary, EMPTY_MAP_PLACEHOLDER)))
    }

    async fn reduce(&self, combined: &str) -> Result<String, StrategyError> {
        tracing::debug!(model = %self.settings.model, "Seq2seq reduce step");
        let summary = self.summarize(combined).await?;
        Ok(non_empty_or(&summary, EMPTY_SUMMARY_SENTINEL))
    }
}
