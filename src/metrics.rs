use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing a batch of analyzer operations.
#[derive(Default)]
pub struct RunMetrics {
    operations_submitted: AtomicU64,
    operations_succeeded: AtomicU64,
    operations_failed: AtomicU64,
    segments_extracted: AtomicU64,
}

impl RunMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation accepted by the service.
    pub fn record_submitted(&self) {
        self.operations_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a succeeded operation and the number of content segments it produced.
    pub fn record_success(&self, segment_count: u64) {
        self.operations_succeeded.fetch_add(1, Ordering::Relaxed);
        self.segments_extracted
            .fetch_add(segment_count, Ordering::Relaxed);
    }

    /// Record a source that could not be analyzed.
    pub fn record_failure(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_submitted: self.operations_submitted.load(Ordering::Relaxed),
            operations_succeeded: self.operations_succeeded.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            segments_extracted: self.segments_extracted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of run counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Operations accepted by the service.
    pub operations_submitted: u64,
    /// Operations that finished with a result.
    pub operations_succeeded: u64,
    /// Sources skipped because submission or polling failed.
    pub operations_failed: u64,
    /// Content segments across all succeeded operations.
    pub segments_extracted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_outcomes_and_segments() {
        let metrics = RunMetrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_success(3);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations_submitted, 2);
        assert_eq!(snapshot.operations_succeeded, 1);
        assert_eq!(snapshot.operations_failed, 1);
        assert_eq!(snapshot.segments_extracted, 3);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let value = serde_json::to_value(RunMetrics::new().snapshot()).expect("json");
        assert_eq!(value["operationsSubmitted"], 0);
        assert_eq!(value["segmentsExtracted"], 0);
    }
}
