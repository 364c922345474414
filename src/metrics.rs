use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization activity.
#[derive(Default)]
pub struct PipelineMetrics {
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    chunks_mapped: AtomicU64,
    chunks_skipped: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a pipeline run.
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that ended with a summary.
    pub fn record_run_succeeded(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that ended with a failure message or an aborted stream.
    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk that produced a partial summary.
    pub fn record_chunk_mapped(&self) {
        self.chunks_mapped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk the strategy declined to summarize.
    pub fn record_chunk_skipped(&self) {
        self.chunks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            chunks_mapped: self.chunks_mapped.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs accepted since startup.
    pub runs_started: u64,
    /// Runs that emitted a summary.
    pub runs_succeeded: u64,
    /// Runs that emitted an error or aborted mid-stream.
    pub runs_failed: u64,
    /// Chunks that produced a partial summary.
    pub chunks_mapped: u64,
    /// Chunks skipped by the strategy.
    pub chunks_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_runs_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_run_started();
        metrics.record_run_started();
        metrics.record_chunk_mapped();
        metrics.record_chunk_mapped();
        metrics.record_chunk_skipped();
        metrics.record_run_succeeded();
        metrics.record_run_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.runs_succeeded, 1);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.chunks_mapped, 2);
        assert_eq!(snapshot.chunks_skipped, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(
            PipelineMetrics::new().snapshot(),
            MetricsSnapshot::default()
        );
    }
}
