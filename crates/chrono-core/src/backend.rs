//! Backend contract.
//!
//! The contract a storage backend must satisfy so that concurrent workers
//! sharing it never both execute the same task, plus stale-claim recovery.
//! Concrete backends (document-store, relational, ...) are out of scope;
//! only this trait and the in-memory reference oracle (`chrono-memory`) are
//! part of this workspace.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::task::{DeleteKey, Kind, ScheduleInput, Task, TaskId};

/// Input to `Backend::claim`.
#[derive(Clone, Debug)]
pub struct ClaimInput {
    pub kind: Kind,
    pub claim_stale_timeout_ms: u64,
}

/// A point-in-time read-only snapshot of one kind's queue depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindStatistics {
    pub pending_count: u64,
    pub claimed_count: u64,
    pub failed_count: u64,
}

/// Errors a backend call may fail with.
///
/// `Unsupported` is reserved for `collect_statistics`: backends that don't
/// implement it return this variant, and the statistics collector
/// treats it as "capability absent" rather than a transient failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("invalid transition for task {id}: {reason}")]
    InvalidTransition { id: TaskId, reason: String },
    #[error("delete refused: task {0} is not pending and force was not requested")]
    DeleteRefused(TaskId),
    #[error("operation not supported by this backend")]
    Unsupported,
    #[error("backend transport error: {0}")]
    Transport(String),
}

/// The pluggable storage + coordination substrate.
///
/// All operations are asynchronous and may fail with a transport error that
/// is propagated unchanged to the caller.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Creates a PENDING task. Atomic with respect to concurrent schedules;
    /// a duplicate `(kind, idempotency_key)` returns the existing
    /// non-terminal task unchanged.
    async fn schedule(&self, input: ScheduleInput) -> Result<Task, BackendError>;

    /// Atomically selects and claims one eligible task of `kind`, ordered by
    /// ascending `priority`, then `scheduled_at`, then `original_schedule_date`.
    /// Two concurrent callers must never both obtain the same task.
    async fn claim(&self, input: ClaimInput) -> Result<Option<Task>, BackendError>;

    /// CLAIMED -> COMPLETED. Idempotent if already COMPLETED.
    async fn complete(&self, id: &TaskId) -> Result<Task, BackendError>;

    /// CLAIMED -> PENDING, bumping `retry_count` by exactly one and
    /// rescheduling to `next_scheduled_at`. Errors if not CLAIMED.
    async fn unclaim(
        &self,
        id: &TaskId,
        next_scheduled_at: DateTime<Utc>,
    ) -> Result<Task, BackendError>;

    /// Any non-terminal -> FAILED.
    async fn fail(&self, id: &TaskId) -> Result<Task, BackendError>;

    /// Removes a PENDING task (or any task when `force` is true). Returns
    /// `Ok(None)` only when `force` is true and the task is absent.
    async fn delete(&self, key: DeleteKey, force: bool) -> Result<Option<Task>, BackendError>;

    /// Optional capability: a read-only snapshot per requested kind.
    /// Backends that don't support statistics leave this at its default,
    /// which disables the statistics collector.
    async fn collect_statistics(
        &self,
        _kinds: &[Kind],
    ) -> Result<HashMap<Kind, KindStatistics>, BackendError> {
        Err(BackendError::Unsupported)
    }
}
