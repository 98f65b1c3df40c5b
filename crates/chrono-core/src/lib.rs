//! Core of Chrono, a durable, pluggable task-scheduling runtime.
//!
//! Task lifecycle ([`task`]), the backend contract two concurrent workers
//! must satisfy ([`backend`]), retry backoff ([`backoff`]), the per-kind
//! control loop ([`processor`]), the orchestrator tying handlers to
//! processors ([`orchestrator`]), the statistics side channel
//! ([`statistics`]), and the ambient stack (events, clock, config, errors)
//! every embedding program needs.

pub mod backend;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod processor;
pub mod statistics;
pub mod task;

pub use backend::{Backend, BackendError, ClaimInput, KindStatistics};
pub use backoff::{BackoffStrategy, Exponential, Jitter, Linear};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{ConfigError, LoadOptions, LoggingConfig, LogFormat, ProcessorDefaults, RuntimeConfig};
pub use error::{ChronoError, HandlerError, ProcessorConfigError};
pub use events::{ChronoEvent, EventBus, ProcessorEvent, StatisticsEvent};
pub use orchestrator::Chrono;
pub use processor::{ProcessorConfig, SimpleProcessor, TaskHandler};
pub use statistics::{StatisticsCollector, StatisticsCollectorConfig};
pub use task::{DeleteKey, IdempotencyKey, Kind, ScheduleInput, Task, TaskId, TaskStatus};
