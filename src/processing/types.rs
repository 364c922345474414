//! Core data types and error definitions for the summarization pipeline.

use crate::generation::GenerationError;
use anyhow::Error as TokenizerError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised when a token budget violates its invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    /// A zero-sized window can never hold a paragraph.
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    /// Overlap must leave room for forward progress between windows.
    #[error("overlap_tokens ({overlap}) must be smaller than max_tokens ({max})")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested window size.
        max: usize,
    },
}

/// Per-backend chunk window: the largest chunk a backend accepts and the overlap carried
/// between consecutive chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenBudget {
    max_tokens: usize,
    overlap_tokens: usize,
}

impl TokenBudget {
    /// Build a budget, enforcing `0 < max_tokens` and `overlap_tokens < max_tokens`.
    pub const fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self, BudgetError> {
        if max_tokens == 0 {
            return Err(BudgetError::ZeroMaxTokens);
        }
        if overlap_tokens >= max_tokens {
            return Err(BudgetError::OverlapTooLarge {
                overlap: overlap_tokens,
                max: max_tokens,
            });
        }
        Ok(Self {
            max_tokens,
            overlap_tokens,
        })
    }

    /// Upper bound on tokens per chunk.
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Tokens shared between the end of one chunk and the start of the next.
    pub const fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Distance between the starts of consecutive windows when slicing one paragraph.
    pub const fn stride(&self) -> usize {
        self.max_tokens - self.overlap_tokens
    }
}

/// A bounded, immutable text segment in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    index: usize,
    text: String,
    token_count: usize,
}

impl Chunk {
    pub(crate) fn new(index: usize, text: String, token_count: usize) -> Self {
        Self {
            index,
            text,
            token_count,
        }
    }

    /// 1-based position of the chunk within the document.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Chunk contents.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Token count reported by the codec that produced the chunk.
    pub fn token_count(&self) -> usize {
        self.token_count
    }
}

/// One mapped chunk, kept in index order until the reduce phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSummary {
    /// 1-based index of the chunk this summary was produced from.
    pub index: usize,
    /// Summary text; never empty.
    pub text: String,
}

/// Map-phase progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Index of the chunk that just finished mapping.
    pub completed: usize,
    /// Number of chunks in the run, skipped chunks included.
    pub total: usize,
}

/// Terminal outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    /// Final summary text, unescaped.
    Success {
        /// Final narrative.
        text: String,
    },
    /// Human-readable description of why the run could not finish.
    Failure {
        /// Failure description.
        message: String,
    },
}

/// Items produced by the orchestrator stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A chunk finished mapping.
    Progress(ProgressEvent),
    /// The run reached a terminal state; nothing follows this event.
    Finished(PipelineResult),
}

/// Errors produced while building or applying a token codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The BPE tables for the requested encoding could not be loaded.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding name that was requested.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
    /// Token ids could not be turned back into UTF-8 text.
    #[error("failed to decode token window: {0}")]
    Decode(String),
}

/// Errors raised by summary strategies during map or reduce.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The underlying engine call failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// The prompt could not be fitted to the model's input window.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The backend call panicked or was aborted before returning.
    #[error("backend task aborted: {0}")]
    Aborted(String),
}

/// Errors raised while loading a backend into the registry.
#[derive(Debug, Error)]
pub enum BackendLoadError {
    /// Requested backend identifier is not in the profile table.
    #[error("Invalid model choice: {0}")]
    UnknownBackend(String),
    /// A required setting for the backend is absent.
    #[error("backend '{backend}' is missing configuration: {setting}")]
    MissingSetting {
        /// Backend identifier.
        backend: String,
        /// Name of the missing setting.
        setting: &'static str,
    },
    /// Tokenizer resources could not be prepared.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// HTTP transport could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Transport(#[from] reqwest::Error),
    /// The loader panicked on its blocking worker.
    #[error("backend loader aborted: {0}")]
    Aborted(String),
}

/// Errors that abort a pipeline run instead of producing a terminal event.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Chunking failed or its worker thread panicked.
    #[error("Failed to chunk document: {0}")]
    Chunking(String),
    /// A chunk could not be summarized; the run cannot continue.
    #[error("Failed to summarize chunk {index}/{total}: {source}")]
    Map {
        /// 1-based chunk index.
        index: usize,
        /// Chunk count for the run.
        total: usize,
        /// Underlying strategy error.
        #[source]
        source: StrategyError,
    },
}
