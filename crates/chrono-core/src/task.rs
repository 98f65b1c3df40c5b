//! Task model and status machine.
//!
//! A pure record type plus the construction-time invariants from the
//! PENDING/CLAIMED/COMPLETED/FAILED state machine. No behavior beyond
//! construction lives here; transitions are enforced by the backend
//! contract (`crate::backend`), not by this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, unique task identifier assigned by the backend at `schedule`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// String tag naming a task category; selects the handler and partitions
/// claim queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Kind(pub String);

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Kind {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Caller-provided string that deduplicates scheduling within a kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub String);

/// Closed enumeration of the four legal task states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states (`COMPLETED`, `FAILED`) admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The sole persisted entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: Kind,
    pub data: serde_json::Value,
    pub status: TaskStatus,
    pub priority: i64,
    pub idempotency_key: Option<IdempotencyKey>,
    pub scheduled_at: DateTime<Utc>,
    pub original_schedule_date: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// Input to `Backend::schedule`.
#[derive(Clone, Debug)]
pub struct ScheduleInput {
    pub kind: Kind,
    pub data: serde_json::Value,
    pub when: DateTime<Utc>,
    pub priority: Option<i64>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl ScheduleInput {
    pub fn new(kind: impl Into<Kind>, data: serde_json::Value, when: DateTime<Utc>) -> Self {
        Self { kind: kind.into(), data, when, priority: None, idempotency_key: None }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(IdempotencyKey(key.into()));
        self
    }
}

/// Lookup key for `Backend::delete`.
#[derive(Clone, Debug)]
pub enum DeleteKey {
    Id(TaskId),
    Idempotency { kind: Kind, idempotency_key: IdempotencyKey },
}
