#![deny(missing_docs)]

//! Long-running-operation client for content-understanding analyzers.

/// Analyzer operations: submission, polling and cleanup.
pub mod analyzer;
/// Credential acquisition for outgoing requests.
pub mod auth;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Batch run counters.
pub mod metrics;
/// Batch runner driving many operations against one temporary analyzer.
pub mod pipeline;
