// packages/engine/src/utils/errors.rs
//! Error types for the interposition engine
//!
//! Forwarding itself never surfaces these to callers: a caller
//! only ever observes the status produced by the lower layer. These errors
//! cover configuration, diagnostics and the plumbing around the core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Payload length mismatch: expected {expected} bytes, got {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },

    #[error("Request {0} was dropped before it was completed")]
    RequestAbandoned(String),

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Observability setup failed: {0}")]
    ObservabilityError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
