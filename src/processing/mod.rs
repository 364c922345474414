//! Summarization pipeline: token codecs, chunking, backend strategies, and orchestration.

pub mod chunking;
pub mod codec;
pub mod registry;
mod service;
pub mod strategy;
pub mod types;

pub use registry::{Backend, BackendRegistry};
pub use service::{EMPTY_TEXT_MESSAGE, PipelineStream, SummarizationApi, SummarizationService};
pub use types::{
    BackendLoadError, BudgetError, Chunk, CodecError, PartialSummary, PipelineError,
    PipelineEvent, PipelineResult, ProgressEvent, StrategyError, TokenBudget,
};
