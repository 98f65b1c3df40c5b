//! Event surfaces.
//!
//! The design note describes a JS-style `Publisher<EventName, Payload>`
//! with `on`/`once`/`off`/`emit`. The idiomatic Rust equivalent of a
//! multi-listener pub/sub with backpressure and automatic unsubscribe-on-drop
//! is `tokio::sync::broadcast`, so each event stream is one broadcast
//! channel; subscribers call `.subscribe()` and get an independent receiver
//! rather than registering an unsubscribe-able closure.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::backend::KindStatistics;
use crate::task::{Kind, Task, TaskId};

/// Emitted by a `SimpleProcessor` over the course of its loop.
#[derive(Clone, Debug)]
pub enum ProcessorEvent {
    Started { kind: Kind },
    Stopped { kind: Kind },
    TaskClaimed { task: Task, at: DateTime<Utc> },
    TaskCompleted { task: Task, duration_ms: u64, at: DateTime<Utc> },
    TaskRetried { task: Task, next_scheduled_at: DateTime<Utc>, retry_count: u32, at: DateTime<Utc> },
    TaskFailed { task: Task, reason: String, at: DateTime<Utc> },
}

/// Emitted by the `StatisticsCollector`.
#[derive(Clone, Debug)]
pub enum StatisticsEvent {
    Sampled { statistics: HashMap<Kind, KindStatistics>, at: DateTime<Utc> },
    CollectionFailed { error: String, at: DateTime<Utc> },
    Unsupported,
}

/// Emitted by the orchestrator for lifecycle-level occurrences that don't
/// belong to any single kind's processor.
#[derive(Clone, Debug)]
pub enum ChronoEvent {
    Started,
    Stopped,
    StopAborted { reason: String },
    TaskScheduled { id: TaskId, kind: Kind },
    TaskDeleted { id: TaskId },
}

/// A thin broadcast channel wrapper: `publish` never blocks and is a no-op
/// when there are no subscribers (mirrors an `emit` with zero listeners).
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns the number of active subscribers that
    /// received it; `Ok(0)` is the expected outcome when nobody is listening.
    pub fn publish(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(256)
    }
}
