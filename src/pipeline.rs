//! Batch runner: one temporary analyzer, many independent operations.
//!
//! Each source gets its own operation, driven concurrently with the others. A source that fails
//! to submit, fails remotely, or times out is logged and reported in its [`SourceOutcome`]; it
//! never aborts the rest of the batch. The temporary analyzer is deleted once every operation has
//! settled, whatever their outcome.

use crate::analyzer::{
    AnalyzerTemplate, AnalyzerTransport, Clock, ContentLocator, LroClient, LroError,
    ResultPayload, SubmitRequest,
};
use crate::metrics::{MetricsSnapshot, RunMetrics};
use futures_util::future::join_all;
use std::path::PathBuf;
use uuid::Uuid;
use walkdir::WalkDir;

/// Result of analyzing one source.
#[derive(Debug)]
pub struct SourceOutcome {
    /// Content that was analyzed.
    pub source: ContentLocator,
    /// Payload on success, the error that made the source unusable otherwise.
    pub result: Result<ResultPayload, LroError>,
}

/// Summary of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Temporary analyzer used for the batch.
    pub analyzer_id: String,
    /// Whether the analyzer was deleted during teardown.
    pub analyzer_deleted: bool,
    /// One entry per source, in input order.
    pub outcomes: Vec<SourceOutcome>,
    /// Counters collected during the run.
    pub metrics: MetricsSnapshot,
}

impl BatchReport {
    /// Outcomes that produced a payload.
    pub fn succeeded(&self) -> impl Iterator<Item = (&ContentLocator, &ResultPayload)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .ok()
                .map(|payload| (&outcome.source, payload))
        })
    }
}

/// Build an analyzer id that is unique per call.
pub fn unique_analyzer_id(prefix: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('-');
    let prefix = if prefix.is_empty() { "analyzer" } else { prefix };
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Expand user inputs into content locators: URLs pass through, directories are walked.
pub fn collect_sources(inputs: &[String]) -> Vec<ContentLocator> {
    let mut sources = Vec::new();
    for input in inputs {
        match ContentLocator::parse(input) {
            ContentLocator::File(path) if path.is_dir() => {
                let mut files: Vec<PathBuf> = WalkDir::new(&path)
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry),
                        Err(error) => {
                            tracing::warn!(error = %error, "Skipping unreadable directory entry");
                            None
                        }
                    })
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .collect();
                files.sort();
                tracing::debug!(directory = %path.display(), files = files.len(), "Collected sources");
                sources.extend(files.into_iter().map(ContentLocator::File));
            }
            locator => sources.push(locator),
        }
    }
    sources
}

/// Analyze every source with `analyzer_id`, one concurrent operation per source.
pub async fn analyze_sources<T, C>(
    client: &LroClient<T, C>,
    analyzer_id: &str,
    sources: Vec<ContentLocator>,
    metrics: &RunMetrics,
) -> Vec<SourceOutcome>
where
    T: AnalyzerTransport,
    C: Clock,
{
    let policy = client.policy();
    let jobs = sources.into_iter().map(|source| async move {
        let request = SubmitRequest::Analyze(source.clone());
        let result = match client.submit(analyzer_id, &request).await {
            Ok(mut operation) => {
                metrics.record_submitted();
                client.poll(&mut operation, policy).await
            }
            Err(error) => Err(error),
        };

        match &result {
            Ok(payload) => {
                let segments = payload.contents().len();
                metrics.record_success(segments as u64);
                tracing::info!(source = %source, segments, "Source analyzed");
            }
            Err(error) => {
                metrics.record_failure();
                tracing::warn!(source = %source, error = %error, "Skipping source");
            }
        }

        SourceOutcome { source, result }
    });

    join_all(jobs).await
}

/// Create a temporary analyzer from `template`, analyze `sources`, then delete the analyzer.
///
/// Fails only when the analyzer itself cannot be created; per-source failures are reported in
/// the returned [`BatchReport`].
pub async fn run_batch<T, C>(
    client: &LroClient<T, C>,
    template: &AnalyzerTemplate,
    prefix: &str,
    sources: Vec<ContentLocator>,
) -> Result<BatchReport, LroError>
where
    T: AnalyzerTransport,
    C: Clock,
{
    let analyzer_id = unique_analyzer_id(prefix);
    tracing::info!(analyzer = %analyzer_id, sources = sources.len(), "Starting batch");

    let created = client
        .submit_and_wait(&analyzer_id, &SubmitRequest::CreateAnalyzer(template.clone()))
        .await;
    if let Err(error) = created {
        client.delete(&analyzer_id).await;
        return Err(error);
    }

    let metrics = RunMetrics::new();
    let outcomes = analyze_sources(client, &analyzer_id, sources, &metrics).await;
    let analyzer_deleted = client.delete(&analyzer_id).await;

    let metrics = metrics.snapshot();
    tracing::info!(
        analyzer = %analyzer_id,
        succeeded = metrics.operations_succeeded,
        failed = metrics.operations_failed,
        segments = metrics.segments_extracted,
        "Batch finished"
    );

    Ok(BatchReport {
        analyzer_id,
        analyzer_deleted,
        outcomes,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_ids_are_unique_and_prefixed() {
        let first = unique_analyzer_id("invoices-");
        let second = unique_analyzer_id("invoices");
        assert!(first.starts_with("invoices-"));
        assert!(!first.starts_with("invoices--"));
        assert_ne!(first, second);
        assert!(unique_analyzer_id("  ").starts_with("analyzer-"));
    }

    #[test]
    fn directories_expand_to_sorted_files() {
        let root = std::env::temp_dir().join(format!("content-lro-sources-{}", Uuid::new_v4()));
        std::fs::create_dir_all(root.join("nested")).expect("create dirs");
        std::fs::write(root.join("b.pdf"), "b").expect("write");
        std::fs::write(root.join("nested").join("a.png"), "a").expect("write");

        let sources = collect_sources(&[
            root.display().to_string(),
            "https://host/video.mp4".to_string(),
        ]);
        let _ = std::fs::remove_dir_all(&root);

        assert_eq!(
            sources,
            vec![
                ContentLocator::File(root.join("b.pdf")),
                ContentLocator::File(root.join("nested").join("a.png")),
                ContentLocator::Url("https://host/video.mp4".into()),
            ]
        );
    }
}
