use crate::store::{DocumentStatus, ProcessingQuality};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_completed: AtomicU64,
    documents_failed: AtomicU64,
    documents_text_only: AtomicU64,
    degraded_stages: AtomicU64,
    refused_runs: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal outcome of one run and how many of its stages degraded.
    pub fn record_run(
        &self,
        status: DocumentStatus,
        quality: Option<ProcessingQuality>,
        degraded_stages: usize,
    ) {
        match status {
            DocumentStatus::Completed => {
                self.documents_completed.fetch_add(1, Ordering::Relaxed);
                if quality == Some(ProcessingQuality::TextOnly) {
                    self.documents_text_only.fetch_add(1, Ordering::Relaxed);
                }
            }
            DocumentStatus::Error => {
                self.documents_failed.fetch_add(1, Ordering::Relaxed);
            }
            DocumentStatus::Uploading | DocumentStatus::Processing => {}
        }
        self.degraded_stages
            .fetch_add(degraded_stages as u64, Ordering::Relaxed);
    }

    /// Record a run refused because the document was already being processed.
    pub fn record_refusal(&self) {
        self.refused_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            documents_text_only: self.documents_text_only.load(Ordering::Relaxed),
            degraded_stages: self.degraded_stages.load(Ordering::Relaxed),
            refused_runs: self.refused_runs.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs that ended in `completed`.
    pub documents_completed: u64,
    /// Runs that ended in `error`.
    pub documents_failed: u64,
    /// Completed runs that stopped at the OCR confidence gate.
    pub documents_text_only: u64,
    /// Stages that fell back or failed, summed over all runs.
    pub degraded_stages: u64,
    /// Invocations refused because the document was already processing.
    pub refused_runs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_terminal_outcomes() {
        let metrics = PipelineMetrics::new();
        metrics.record_run(DocumentStatus::Completed, Some(ProcessingQuality::Full), 1);
        metrics.record_run(DocumentStatus::Completed, Some(ProcessingQuality::TextOnly), 0);
        metrics.record_run(DocumentStatus::Error, None, 2);
        metrics.record_refusal();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_completed, 2);
        assert_eq!(snapshot.documents_text_only, 1);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.degraded_stages, 3);
        assert_eq!(snapshot.refused_runs, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
