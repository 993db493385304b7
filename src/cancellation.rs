//! Cooperative cancellation for sampling passes
//!
//! Same shape as a shared shutdown flag: the evaluator keeps one token per
//! in-flight pass and hands a clone to the pass, which polls it at every
//! loop boundary.

use crate::error::{EvaluatorError, EvaluatorResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation has been requested
    #[inline]
    pub fn check(&self) -> EvaluatorResult<()> {
        if self.is_cancelled() {
            Err(EvaluatorError::Cancelled)
        } else {
            Ok(())
        }
    }
}
