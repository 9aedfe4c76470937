//! Analyzer operations: submit, poll, and clean up long-running jobs.

pub mod client;
pub mod lro;
pub mod payload;
pub mod poller;
pub mod types;

pub use client::ContentUnderstandingClient;
pub use lro::{AnalyzerTransport, LroClient};
pub use payload::{ContentSegment, ResultPayload};
pub use poller::{Clock, PollError, PollPolicy, Tick, TokioClock, poll_until};
pub use types::{
    AnalyzerConfig, AnalyzerTemplate, ContentLocator, LroError, Operation, OperationHandle,
    OperationSnapshot, OperationStatus, SubmitRequest,
};
