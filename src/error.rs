//! Error types for the signal engine
//!
//! Sampling-pass failures never escape the background thread; they are
//! logged and the previously published state stays in effect. The variants
//! here are what the resolver, sampler and interpolator builder report to
//! the evaluator, plus the ambient config/project layers.

use crate::signal_data::{SignalId, SignalKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// A signal is (transitively) its own dependency
    #[error("cyclic dependency on signal with id: {0}")]
    CyclicDependency(SignalId),

    /// A dependency id is missing from the snapshot
    #[error("unknown signal dependency with id: {0}")]
    UnresolvedDependency(SignalId),

    /// The signal kind cannot be sampled or interpolated this way
    #[error("{0} signals are not supported here")]
    UnsupportedSignalKind(SignalKind),

    /// The pass was superseded by a newer one
    #[error("sampling pass cancelled")]
    Cancelled,

    /// The background sampling thread could not run to completion
    #[error("sampler thread failed: {0}")]
    SamplerThread(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("project error: {0}")]
    Project(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvaluatorError {
    /// Cancellation is expected and never logged as a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EvaluatorError::Cancelled)
    }
}

/// Result type for engine operations
pub type EvaluatorResult<T> = Result<T, EvaluatorError>;
