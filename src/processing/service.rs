//! Summarization service driving chunking, the map phase, and the reduce phase.

use crate::{
    config::{BackendProfile, Config, backend_profiles},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::chunk_text,
        registry::BackendRegistry,
        strategy::MapContext,
        types::{
            PartialSummary, PipelineError, PipelineEvent, PipelineResult, ProgressEvent,
            StrategyError,
        },
    },
};
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{Instrument, Span};
use uuid::Uuid;

/// Terminal message for documents with no summarizable text.
pub const EMPTY_TEXT_MESSAGE: &str = "No readable text found. This might be a scanned image PDF.";

/// Boxed event stream for one pipeline run.
pub type PipelineStream =
    Pin<Box<dyn Stream<Item = Result<PipelineEvent, PipelineError>> + Send + 'static>>;

/// Runs map-reduce summaries against the backends held in a [`BackendRegistry`].
///
/// Each call to [`SummarizationService::summarize`] returns an independent stream, so any
/// number of runs may proceed concurrently. The registry and metrics are the only state
/// shared between runs. Construct the service once near process start and share it through
/// an `Arc`.
pub struct SummarizationService {
    registry: Arc<BackendRegistry>,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the summarization pipeline used by external surfaces (HTTP, CLI).
pub trait SummarizationApi: Send + Sync {
    /// Start a run over `text` with the backend named `backend_id`.
    fn summarize(&self, text: String, backend_id: String) -> PipelineStream;

    /// Backends that can be selected.
    fn backends(&self) -> Vec<BackendProfile>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl SummarizationService {
    /// Build a service whose registry covers every configured backend profile.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_registry(BackendRegistry::from_config(config))
    }

    /// Build a service over an explicit registry.
    pub fn with_registry(registry: BackendRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Summarize `text` with the backend named `backend_id`.
    ///
    /// The stream yields zero or more [`PipelineEvent::Progress`] items followed by exactly
    /// one [`PipelineEvent::Finished`], or ends early with a [`PipelineError`] when a chunk
    /// cannot be mapped.
    pub fn summarize(&self, text: String, backend_id: String) -> PipelineStream {
        let metrics = Arc::clone(&self.metrics);
        let events = run_pipeline(
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            text,
            backend_id,
        );
        Box::pin(events.inspect(move |item| match item {
            Ok(PipelineEvent::Finished(PipelineResult::Success { .. })) => {
                metrics.record_run_succeeded()
            }
            Ok(PipelineEvent::Finished(PipelineResult::Failure { .. })) | Err(_) => {
                metrics.record_run_failed()
            }
            Ok(PipelineEvent::Progress(_)) => {}
        }))
    }

    /// Profiles of the backends held by the registry.
    pub fn backends(&self) -> Vec<BackendProfile> {
        self.registry
            .ids()
            .iter()
            .filter_map(|id| backend_profiles().iter().find(|profile| profile.id == id))
            .copied()
            .collect()
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl SummarizationApi for SummarizationService {
    fn summarize(&self, text: String, backend_id: String) -> PipelineStream {
        SummarizationService::summarize(self, text, backend_id)
    }

    fn backends(&self) -> Vec<BackendProfile> {
        SummarizationService::backends(self)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        SummarizationService::metrics_snapshot(self)
    }
}

fn run_pipeline(
    registry: Arc<BackendRegistry>,
    metrics: Arc<PipelineMetrics>,
    text: String,
    backend_id: String,
) -> impl Stream<Item = Result<PipelineEvent, PipelineError>> + Send + 'static {
    try_stream! {
        let span = tracing::info_span!(
            "pipeline",
            run_id = %Uuid::new_v4(),
            backend = %backend_id.trim()
        );
        metrics.record_run_started();

        // Blank input never needs the backend loaded; an unknown id still fails below.
        if registry.contains(&backend_id) && text.trim().is_empty() {
            tracing::info!(parent: &span, "Document has no readable text");
            yield empty_document();
            return;
        }

        let backend = match registry.get(&backend_id).instrument(span.clone()).await {
            Ok(backend) => backend,
            Err(error) => {
                tracing::warn!(parent: &span, error = %error, "Backend unavailable");
                yield PipelineEvent::Finished(PipelineResult::Failure {
                    message: error.to_string(),
                });
                return;
            }
        };

        let budget = backend.budget();
        let codec = backend.codec();
        let input_chars = text.chars().count();
        let chunks = tokio::task::spawn_blocking(move || chunk_text(&text, budget, codec.as_ref()))
            .await
            .map_err(|error| PipelineError::Chunking(error.to_string()))?
            .map_err(|error| PipelineError::Chunking(error.to_string()))?;
        if chunks.is_empty() {
            tracing::info!(parent: &span, "Chunking produced no chunks");
            yield empty_document();
            return;
        }

        let total = chunks.len();
        tracing::info!(
            parent: &span,
            backend = backend.id(),
            chunks = total,
            input_chars,
            max_tokens = budget.max_tokens(),
            overlap_tokens = budget.overlap_tokens(),
            "Document chunked"
        );

        let strategy = backend.strategy();
        let context = MapContext { total_chunks: total };
        let mut partials: Vec<PartialSummary> = Vec::with_capacity(total);
        for chunk in chunks {
            let index = chunk.index();
            let mapper = Arc::clone(&strategy);
            let outcome = run_isolated(
                async move { mapper.map(&chunk, context).await },
                span.clone(),
            )
            .await
            .map_err(|source| PipelineError::Map { index, total, source })?;

            match outcome {
                Some(text) => {
                    metrics.record_chunk_mapped();
                    partials.push(PartialSummary { index, text });
                    tracing::debug!(parent: &span, chunk = index, total, "Chunk mapped");
                    yield PipelineEvent::Progress(ProgressEvent { completed: index, total });
                }
                None => {
                    metrics.record_chunk_skipped();
                    tracing::debug!(parent: &span, chunk = index, total, "Chunk skipped");
                }
            }
        }

        if partials.is_empty() {
            tracing::info!(parent: &span, chunks = total, "Every chunk was skipped");
            yield empty_document();
            return;
        }

        let combined = partials
            .iter()
            .map(|partial| partial.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let reducer = Arc::clone(&strategy);
        let reduced = run_isolated(
            async move { reducer.reduce(&combined).await },
            span.clone(),
        )
        .await;
        let result = match reduced {
            Ok(text) => {
                tracing::info!(parent: &span, partials = partials.len(), "Summary complete");
                PipelineResult::Success { text }
            }
            Err(error) => {
                tracing::warn!(parent: &span, error = %error, "Reduce phase failed");
                PipelineResult::Failure {
                    message: format!("Could not generate final summary. Error: {error}"),
                }
            }
        };
        yield PipelineEvent::Finished(result);
    }
}

fn empty_document() -> PipelineEvent {
    PipelineEvent::Finished(PipelineResult::Success {
        text: EMPTY_TEXT_MESSAGE.to_string(),
    })
}

/// Run one backend call on its own task so a panic surfaces as [`StrategyError::Aborted`].
async fn run_isolated<T, F>(call: F, span: Span) -> Result<T, StrategyError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, StrategyError>> + Send + 'static,
{
    tokio::spawn(call.instrument(span))
        .await
        .map_err(|error| StrategyError::Aborted(error.to_string()))?
}
