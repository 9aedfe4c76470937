//! Create-then-poll driver for analyzer operations.

use crate::analyzer::{
    payload::ResultPayload,
    poller::{Clock, PollError, PollPolicy, Tick, TokioClock, poll_until},
    types::{
        AnalyzerConfig, LroError, Operation, OperationHandle, OperationSnapshot, OperationStatus,
        SubmitRequest,
    },
};
use async_trait::async_trait;
use std::sync::Mutex;

/// Wire-level operations the LRO client needs from the service.
///
/// Every method performs exactly one request.
#[async_trait]
pub trait AnalyzerTransport: Send + Sync {
    /// Start a create-analyzer or analyze request and return where to poll.
    async fn submit(
        &self,
        analyzer_id: &str,
        request: &SubmitRequest,
    ) -> Result<OperationHandle, LroError>;

    /// Fetch the current state of an operation.
    async fn fetch(&self, handle: &OperationHandle) -> Result<OperationSnapshot, LroError>;

    /// Delete an analyzer.
    async fn delete(&self, analyzer_id: &str) -> Result<(), LroError>;
}

/// Drives submit/poll/delete against an [`AnalyzerTransport`].
pub struct LroClient<T, C = TokioClock> {
    transport: T,
    clock: C,
    policy: PollPolicy,
}

impl<T: AnalyzerTransport> LroClient<T> {
    /// Wrap a transport, polling on the tokio timer with `policy` by default.
    pub fn new(transport: T, policy: PollPolicy) -> Self {
        Self::with_clock(transport, TokioClock::new(), policy)
    }
}

impl<T: AnalyzerTransport, C: Clock> LroClient<T, C> {
    /// Wrap a transport with an explicit clock.
    pub fn with_clock(transport: T, clock: C, policy: PollPolicy) -> Self {
        Self {
            transport,
            clock,
            policy,
        }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Default polling policy.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Start an operation. Request failures propagate immediately.
    pub async fn submit(
        &self,
        analyzer_id: &str,
        request: &SubmitRequest,
    ) -> Result<Operation, LroError> {
        let handle = self.transport.submit(analyzer_id, request).await?;
        tracing::info!(analyzer = analyzer_id, operation = %handle, "Operation submitted");
        Ok(Operation::new(analyzer_id, handle))
    }

    /// Poll `operation` until it is terminal or `policy.timeout` elapses.
    ///
    /// Errors raised while fetching the status are retried on the next interval; only a
    /// terminal `Failed` status or the timeout end the loop with an error.
    pub async fn poll(
        &self,
        operation: &mut Operation,
        policy: PollPolicy,
    ) -> Result<ResultPayload, LroError> {
        if let Some(payload) = operation.result() {
            return Ok(payload.clone());
        }
        if let Some(detail) = operation.failure() {
            return Err(LroError::OperationFailed {
                detail: detail.to_string(),
            });
        }

        let handle = operation.handle().clone();
        let observed = Mutex::new(operation.status());
        let (transport, handle_ref, observed_ref) = (&self.transport, &handle, &observed);

        let outcome = poll_until(&self.clock, policy, move |attempt| {
            let (handle, observed) = (handle_ref, observed_ref);
            async move {
                let snapshot = match transport.fetch(handle).await {
                    Ok(snapshot) => snapshot,
                    Err(error) => return Tick::Retry(error.to_string()),
                };
                let status = match snapshot.parsed_status() {
                    Ok(status) => status,
                    Err(error) => return Tick::Retry(error.to_string()),
                };
                tracing::debug!(operation = %handle, attempt, ?status, "Polled operation");
                if let Ok(mut current) = observed.lock() {
                    *current = current.advance(status);
                }

                match status {
                    OperationStatus::Succeeded => Tick::Ready(ResultPayload::new(
                        snapshot.result.unwrap_or_default(),
                    )),
                    OperationStatus::Failed => Tick::Failed(snapshot.failure_detail()),
                    OperationStatus::NotStarted | OperationStatus::Running => Tick::Pending,
                }
            }
        })
        .await;

        if let Ok(status) = observed.into_inner() {
            operation.observe(status);
        }

        match outcome {
            Ok(payload) => {
                tracing::info!(operation = %operation.handle(), "Operation succeeded");
                operation.succeed(payload.clone());
                Ok(payload)
            }
            Err(PollError::Failed(detail)) => {
                tracing::error!(operation = %operation.handle(), detail = %detail, "Operation failed");
                operation.fail(detail.clone());
                Err(LroError::OperationFailed { detail })
            }
            Err(PollError::Timeout { attempts, elapsed }) => {
                Err(LroError::Timeout { attempts, elapsed })
            }
        }
    }

    /// Submit a request and wait for it with the default policy.
    pub async fn submit_and_wait(
        &self,
        analyzer_id: &str,
        request: &SubmitRequest,
    ) -> Result<ResultPayload, LroError> {
        let mut operation = self.submit(analyzer_id, request).await?;
        self.poll(&mut operation, self.policy).await
    }

    /// Best-effort analyzer deletion. Returns whether the service confirmed it.
    pub async fn delete(&self, analyzer_id: &str) -> bool {
        match self.transport.delete(analyzer_id).await {
            Ok(()) => {
                tracing::info!(analyzer = analyzer_id, "Analyzer deleted");
                true
            }
            Err(error) => {
                tracing::warn!(analyzer = analyzer_id, error = %error, "Failed to delete analyzer");
                false
            }
        }
    }

    /// Create the analyzer, analyze the configured content, then delete the analyzer.
    pub async fn run(&self, config: &AnalyzerConfig) -> Result<ResultPayload, LroError> {
        let created = self
            .submit_and_wait(
                config.id(),
                &SubmitRequest::CreateAnalyzer(config.template().clone()),
            )
            .await;
        if let Err(error) = created {
            self.delete(config.id()).await;
            return Err(error);
        }

        let analysis = self
            .submit_and_wait(config.id(), &SubmitRequest::Analyze(config.content().clone()))
            .await;
        self.delete(config.id()).await;
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::poller::testing::ManualClock;
    use crate::analyzer::types::{AnalyzerTemplate, ContentLocator};
    use reqwest::StatusCode;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// In-memory transport replaying a fixed sequence of status responses.
    #[derive(Default)]
    struct ScriptedTransport {
        polls: Mutex<VecDeque<Result<OperationSnapshot, LroError>>>,
        fetches: AtomicU32,
        submits: AtomicU32,
        deletes: AtomicU32,
        reject_submit: bool,
        reject_delete: bool,
    }

    impl ScriptedTransport {
        fn with_polls(polls: Vec<Result<OperationSnapshot, LroError>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                ..Self::default()
            }
        }

        fn fetches(&self) -> u32 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalyzerTransport for ScriptedTransport {
        async fn submit(
            &self,
            analyzer_id: &str,
            _request: &SubmitRequest,
        ) -> Result<OperationHandle, LroError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.reject_submit {
                return Err(LroError::UnexpectedStatus {
                    status: StatusCode::BAD_REQUEST,
                    body: "invalid template".into(),
                });
            }
            Ok(OperationHandle::new(format!(
                "https://svc/operations/{analyzer_id}"
            )))
        }

        async fn fetch(&self, _handle: &OperationHandle) -> Result<OperationSnapshot, LroError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Ok(snapshot("Running", None, None)))
        }

        async fn delete(&self, _analyzer_id: &str) -> Result<(), LroError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.reject_delete {
                return Err(LroError::UnexpectedStatus {
                    status: StatusCode::NOT_FOUND,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    fn snapshot(status: &str, result: Option<Value>, error: Option<Value>) -> OperationSnapshot {
        OperationSnapshot {
            status: status.to_string(),
            result,
            error,
        }
    }

    fn client(transport: ScriptedTransport) -> LroClient<ScriptedTransport, ManualClock> {
        LroClient::with_clock(transport, ManualClock::default(), PollPolicy::from_secs(1, 10))
    }

    fn operation() -> Operation {
        Operation::new("demo", OperationHandle::new("https://svc/operations/1"))
    }

    #[tokio::test]
    async fn returns_payload_of_terminal_response() {
        let payload = json!({ "contents": [ { "markdown": "hello" } ] });
        let lro = client(ScriptedTransport::with_polls(vec![
            Ok(snapshot("NotStarted", None, None)),
            Ok(snapshot("Running", None, None)),
            Ok(snapshot("Succeeded", Some(payload.clone()), None)),
        ]));
        let mut op = operation();

        let result = lro.poll(&mut op, lro.policy()).await.expect("payload");

        assert_eq!(result.as_value(), &payload);
        assert_eq!(op.status(), OperationStatus::Succeeded);
        assert_eq!(op.result(), Some(&result));
        assert_eq!(lro.transport().fetches(), 3);
    }

    #[tokio::test]
    async fn failed_status_surfaces_detail_after_three_ticks() {
        let lro = client(ScriptedTransport::with_polls(vec![
            Ok(snapshot("Running", None, None)),
            Ok(snapshot("Running", None, None)),
            Ok(snapshot("Failed", None, Some(json!({ "message": "x" })))),
        ]));
        let mut op = operation();

        let error = lro.poll(&mut op, lro.policy()).await.expect_err("failure");

        assert!(matches!(&error, LroError::OperationFailed { detail } if detail.contains('x')));
        assert_eq!(lro.transport().fetches(), 3);
        assert_eq!(op.status(), OperationStatus::Failed);
        assert_eq!(op.failure(), Some("x"));
    }

    #[tokio::test]
    async fn never_terminal_times_out_without_extra_requests() {
        let lro = LroClient::with_clock(
            ScriptedTransport::default(),
            ManualClock::default(),
            PollPolicy::from_secs(2, 7),
        );
        let mut op = operation();

        let error = lro.poll(&mut op, lro.policy()).await.expect_err("timeout");

        let LroError::Timeout { attempts, elapsed } = error else {
            panic!("expected timeout, got {error:?}");
        };
        assert_eq!(attempts, 4);
        assert_eq!(elapsed, Duration::from_secs(7));
        assert_eq!(lro.transport().fetches(), attempts);
        assert_eq!(op.status(), OperationStatus::Running);
    }

    #[tokio::test]
    async fn transient_error_is_retried() {
        let payload = json!({ "contents": [] });
        let lro = client(ScriptedTransport::with_polls(vec![
            Err(LroError::InvalidResponse("connection reset".into())),
            Ok(snapshot("Succeeded", Some(payload.clone()), None)),
        ]));
        let mut op = operation();

        let result = lro.poll(&mut op, lro.policy()).await.expect("payload");

        assert_eq!(result.as_value(), &payload);
        assert_eq!(lro.transport().fetches(), 2);
    }

    #[tokio::test]
    async fn unknown_status_is_retried_like_a_transport_error() {
        let lro = client(ScriptedTransport::with_polls(vec![
            Ok(snapshot("Throttled", None, None)),
            Ok(snapshot("succeeded", None, None)),
        ]));
        let mut op = operation();

        let result = lro.poll(&mut op, lro.policy()).await.expect("payload");
        assert_eq!(result.as_value(), &Value::Null);
    }

    #[tokio::test]
    async fn polling_a_finished_operation_issues_no_request() {
        let lro = client(ScriptedTransport::with_polls(vec![Ok(snapshot(
            "Succeeded",
            Some(json!({ "contents": [] })),
            None,
        ))]));
        let mut op = operation();
        lro.poll(&mut op, lro.policy()).await.expect("payload");
        lro.poll(&mut op, lro.policy()).await.expect("cached payload");
        assert_eq!(lro.transport().fetches(), 1);
    }

    #[tokio::test]
    async fn submit_propagates_request_errors() {
        let lro = client(ScriptedTransport {
            reject_submit: true,
            ..ScriptedTransport::default()
        });
        let error = lro
            .submit(
                "demo",
                &SubmitRequest::Analyze(ContentLocator::Url("https://host/a.pdf".into())),
            )
            .await
            .expect_err("rejected");
        assert_eq!(error.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(lro.transport().fetches(), 0);
    }

    #[tokio::test]
    async fn delete_reports_without_raising() {
        let lro = client(ScriptedTransport {
            reject_delete: true,
            ..ScriptedTransport::default()
        });
        assert!(!lro.delete("demo").await);

        let lro = client(ScriptedTransport::default());
        assert!(lro.delete("demo").await);
    }

    #[tokio::test]
    async fn run_deletes_analyzer_even_when_analysis_fails() {
        let lro = client(ScriptedTransport::with_polls(vec![
            Ok(snapshot("Succeeded", Some(json!({ "analyzerId": "demo" })), None)),
            Ok(snapshot("Failed", None, Some(json!({ "code": "BadInput" })))),
        ]));
        let config = AnalyzerConfig::new(
            "demo",
            AnalyzerTemplate::from_value(json!({ "scenario": "document" })),
            ContentLocator::Url("https://host/a.pdf".into()),
        );

        let error = lro.run(&config).await.expect_err("analysis failure");

        assert!(matches!(error, LroError::OperationFailed { .. }));
        assert_eq!(lro.transport().submits.load(Ordering::SeqCst), 2);
        assert_eq!(lro.transport().deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_deletes_analyzer_when_creation_fails() {
        let lro = client(ScriptedTransport::with_polls(vec![Ok(snapshot(
            "Failed",
            None,
            Some(json!({ "code": "InvalidTemplate" })),
        ))]));
        let config = AnalyzerConfig::new(
            "demo",
            AnalyzerTemplate::from_value(json!({ "scenario": "document" })),
            ContentLocator::Url("https://host/a.pdf".into()),
        );

        let error = lro.run(&config).await.expect_err("creation failure");

        assert!(matches!(error, LroError::OperationFailed { .. }));
        assert_eq!(lro.transport().submits.load(Ordering::SeqCst), 1);
        assert_eq!(lro.transport().deletes.load(Ordering::SeqCst), 1);
    }
}
