//! Text generation engines behind the summary strategies.
//!
//! Every engine is reached over HTTP and exposes the same single call: turn a prompt into
//! text. Strategies own the prompt wording and the cleanup of what comes back; generators
//! only move bytes and report transport or decoding failures.
//!
//! - [`OllamaGenerator`]: local quantized causal models served by an Ollama runtime.
//! - [`HuggingFaceGenerator`]: seq2seq summarization models behind a Hugging Face
//!   inference endpoint.
//! - [`GeminiGenerator`]: the hosted Gemini `generateContent` API.

mod gemini;
mod huggingface;
mod ollama;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

pub use gemini::GeminiGenerator;
pub use huggingface::HuggingFaceGenerator;
pub use ollama::OllamaGenerator;

/// Errors surfaced by generation engines.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Engine was unreachable or rejected the route.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Engine returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Engine response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Decoding settings for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier understood by the engine.
    pub model: String,
    /// Fully assembled prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_new_tokens: usize,
    /// Lower bound on generated tokens, for engines that honor one.
    pub min_new_tokens: Option<usize>,
    /// Sampling temperature; kept low for factual extraction.
    pub temperature: f32,
    /// Penalty applied to repeated tokens.
    pub repetition_penalty: Option<f32>,
    /// Beam count for beam-search decoders.
    pub num_beams: Option<u32>,
    /// Exponential length penalty for beam search.
    pub length_penalty: Option<f32>,
}

impl GenerationRequest {
    /// Default temperature used by every strategy.
    pub const LOW_TEMPERATURE: f32 = 0.1;

    /// Build a request with low temperature and no optional decoding knobs.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, max_new_tokens: usize) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            max_new_tokens,
            min_new_tokens: None,
            temperature: Self::LOW_TEMPERATURE,
            repetition_penalty: None,
            num_beams: None,
            length_penalty: None,
        }
    }

    /// Require at least `tokens` generated tokens.
    pub fn with_min_new_tokens(mut self, tokens: usize) -> Self {
        self.min_new_tokens = Some(tokens);
        self
    }

    /// Penalize repeated tokens.
    pub fn with_repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    /// Enable beam search with `beams` beams.
    pub fn with_beams(mut self, beams: u32) -> Self {
        self.num_beams = Some(beams);
        self
    }

    /// Bias beam search toward longer (`> 1.0`) or shorter outputs.
    pub fn with_length_penalty(mut self, penalty: f32) -> Self {
        self.length_penalty = Some(penalty);
        self
    }
}

/// Interface implemented by generation engines.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for the request. Returns the engine's raw output, trimmed.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Build the shared HTTP client used by one engine.
pub(crate) fn build_http_client(agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format!("rustysum/{agent}"))
        .timeout(timeout)
        .build()
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Turn a non-success HTTP response into a [`GenerationError`].
pub(crate) async fn error_for_status(
    engine: &str,
    url: &str,
    response: reqwest::Response,
) -> GenerationError {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return GenerationError::ProviderUnavailable(format!(
            "{engine} endpoint {url} returned 404"
        ));
    }
    let body = response.text().await.unwrap_or_default();
    GenerationError::GenerationFailed(format!("{engine} returned {status}: {body}"))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    type Responder =
        Box<dyn Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync>;

    /// Generator that records every request and answers through a closure.
    pub(crate) struct ScriptedGenerator {
        responder: Responder,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(
            responder: impl Fn(&GenerationRequest) -> Result<String, GenerationError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Always answer with `text`.
        pub(crate) fn replying(text: &str) -> Self {
            let text = text.to_string();
            Self::new(move |_| Ok(text.clone()))
        }

        pub(crate) async fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            let reply = (self.responder)(&request);
            self.requests.lock().await.push(request);
            reply
        }
    }
}
