//! Error taxonomy.
//!
//! A small set of enums connected by `#[from]`, mirroring a
//! domain-error/application-error/interface-error layering: `BackendError`
//! (crate::backend) is the domain layer, `HandlerError` wraps a task
//! handler's failure, and `ChronoError` is the top-level error a caller of
//! the orchestrator or processor sees.

use thiserror::Error;

use crate::backend::BackendError;
use crate::task::TaskId;

/// The error a `TaskHandler::execute` implementation returns.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed for task {id}: {reason}")]
    Failed { id: TaskId, reason: String },
    #[error("handler for task {id} timed out")]
    Timeout { id: TaskId },
}

/// Rejected at `SimpleProcessor` construction time.
#[derive(Debug, Error)]
pub enum ProcessorConfigError {
    #[error(
        "task_handler_timeout_ms ({handler_timeout_ms}) must be strictly less than \
         claim_stale_timeout_ms ({claim_stale_timeout_ms}), or a still-running claim \
         would be reclaimed by another worker before its own handler gives up"
    )]
    HandlerTimeoutNotLessThanClaimStaleTimeout { handler_timeout_ms: u64, claim_stale_timeout_ms: u64 },

    #[error(
        "claim_interval_ms ({claim_interval_ms}) must be strictly less than idle_interval_ms \
         ({idle_interval_ms}), otherwise idle polling would be busier than active polling"
    )]
    ClaimIntervalNotLessThanIdleInterval { claim_interval_ms: u64, idle_interval_ms: u64 },

    #[error("no kind configured for this processor")]
    MissingKind,
}

/// The top-level error surfaced by the orchestrator and the CLI.
#[derive(Debug, Error)]
pub enum ChronoError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Config(#[from] ProcessorConfigError),

    #[error("a handler is already registered for kind {0}")]
    DuplicateRegistration(String),

    #[error("registration is only permitted before start()")]
    RegistrationAfterStart,

    #[error("failed to start processor for kind {kind}: {source}")]
    StartFailed { kind: String, #[source] source: Box<ChronoError> },

    #[error("processor loop task for kind {kind} panicked: {source}")]
    JoinFailed { kind: String, #[source] source: tokio::task::JoinError },
}
