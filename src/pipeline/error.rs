use std::sync::Arc;

use super::PipelineState;

/// An error reported by a [`Pipeline`](super::Pipeline) or by the session
/// processor running inside it.
///
/// The variants are deliberately distinct classes, so that callers can branch:
/// a [`Configuration`](PipelineError::Configuration) error means the input
/// must be fixed, an [`InvalidTransition`](PipelineError::InvalidTransition)
/// or [`Disposed`](PipelineError::Disposed) error means the caller misused the
/// pipeline, and [`Aborted`](PipelineError::Aborted) means the collection was
/// torn down mid-flight, which a shutting-down caller may choose not to treat
/// as a failure.
///
/// The type is `Clone` because the result of a run/stop is shared between
/// every caller that awaits the same cached task.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Invalid settings, detected at construction. Never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An operation was invoked in a state that forbids it.
    #[error("invalid pipeline transition from {from:?} to {to:?}")]
    InvalidTransition { from: PipelineState, to: PipelineState },

    /// The pipeline has already been disposed.
    #[error("the pipeline has been disposed")]
    Disposed,

    /// The diagnostics channel could not establish the session.
    #[error("failed to start collection: {0}")]
    SessionStart(Arc<anyhow::Error>),

    /// The collection failed while it was running.
    #[error("collection failed: {0}")]
    Runtime(Arc<anyhow::Error>),

    /// Cancellation or disposal interrupted an otherwise healthy collection.
    ///
    /// Distinct from a caller-requested stop: a stopped pipeline completes its
    /// run with `Ok(())` after the graceful flush.
    #[error("collection was aborted")]
    Aborted,
}

impl PipelineError {
    pub(crate) fn session_start(cause: anyhow::Error) -> Self {
        Self::SessionStart(Arc::new(cause))
    }

    pub(crate) fn runtime(cause: anyhow::Error) -> Self {
        Self::Runtime(Arc::new(cause))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns true if the collection was torn down mid-flight by cancellation
    /// or disposal.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns true for caller-misuse errors (invalid transition, use after
    /// dispose), as opposed to operational failures.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::Disposed)
    }
}
