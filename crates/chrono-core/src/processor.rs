//! Per-kind control loop.
//!
//! Grounded on `SocketModeRunner::start`/`connect_and_pump`: a sequential
//! `loop { .. }` with structured `tracing` events and cooperative shutdown
//! via a notify-backed stop flag rather than task cancellation, since an
//! in-flight handler must be drained, never aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{Backend, ClaimInput};
use crate::backoff::BackoffStrategy;
use crate::clock::Clock;
use crate::error::{ChronoError, HandlerError, ProcessorConfigError};
use crate::events::{EventBus, ProcessorEvent};
use crate::task::{Kind, Task};

/// User-supplied execution logic for one task kind.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

/// `SimpleProcessor`'s construction-time-validated tuning knobs.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub claim_interval_ms: u64,
    pub idle_interval_ms: u64,
    pub task_handler_timeout_ms: u64,
    pub claim_stale_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            claim_interval_ms: 1000,
            idle_interval_ms: 5000,
            task_handler_timeout_ms: 30_000,
            claim_stale_timeout_ms: 60_000,
            max_retries: 10,
        }
    }
}

impl ProcessorConfig {
    fn validate(&self) -> Result<(), ProcessorConfigError> {
        if self.task_handler_timeout_ms >= self.claim_stale_timeout_ms {
            return Err(ProcessorConfigError::HandlerTimeoutNotLessThanClaimStaleTimeout {
                handler_timeout_ms: self.task_handler_timeout_ms,
                claim_stale_timeout_ms: self.claim_stale_timeout_ms,
            });
        }

        if self.claim_interval_ms >= self.idle_interval_ms {
            return Err(ProcessorConfigError::ClaimIntervalNotLessThanIdleInterval {
                claim_interval_ms: self.claim_interval_ms,
                idle_interval_ms: self.idle_interval_ms,
            });
        }

        Ok(())
    }
}

/// Drives one task kind through claim -> execute -> finalize, repeatedly.
pub struct SimpleProcessor<B: Backend + 'static> {
    kind: Kind,
    backend: Arc<B>,
    handler: Arc<dyn TaskHandler>,
    backoff: Arc<dyn BackoffStrategy>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    config: ProcessorConfig,
    events: EventBus<ProcessorEvent>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Backend + 'static> SimpleProcessor<B> {
    pub fn new(
        kind: impl Into<Kind>,
        backend: Arc<B>,
        handler: Arc<dyn TaskHandler>,
        backoff: Arc<dyn BackoffStrategy>,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Result<Arc<Self>, ProcessorConfigError> {
        let kind = kind.into();
        if kind.0.trim().is_empty() {
            return Err(ProcessorConfigError::MissingKind);
        }
        config.validate()?;

        Ok(Arc::new(Self {
            kind,
            backend,
            handler,
            backoff,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            config,
            events: EventBus::default(),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            join_handle: Mutex::new(None),
        }))
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Idempotent: a second call while running is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), ChronoError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.run_loop().await });
        *self.join_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Idempotent: waits for any in-flight claim/handler to resolve or time
    /// out before returning. Never abandons a CLAIMED task.
    pub async fn stop(&self) -> Result<(), ChronoError> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let handle = self.join_handle.lock().await.take();
        let result = match handle {
            Some(handle) => handle.await.map_err(|source| ChronoError::JoinFailed { kind: self.kind.0.clone(), source }),
            None => Ok(()),
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless a stop is signaled first. Returns `true`
    /// if the caller should exit the loop.
    async fn wait_unless_stopped(&self, duration: Duration) -> bool {
        if self.is_stop_requested() {
            return true;
        }
        tokio::select! {
            _ = self.clock.sleep(duration) => self.is_stop_requested(),
            _ = self.stop_notify.notified() => true,
        }
    }

    async fn run_loop(self: Arc<Self>) {
        self.events.publish(ProcessorEvent::Started { kind: self.kind.clone() });
        info!(event_name = "processor.started", kind = %self.kind, "processor started");

        loop {
            if self.is_stop_requested() {
                break;
            }

            let claimed = self
                .backend
                .claim(ClaimInput { kind: self.kind.clone(), claim_stale_timeout_ms: self.config.claim_stale_timeout_ms })
                .await;

            let task = match claimed {
                Ok(Some(task)) => task,
                Ok(None) => {
                    if self.wait_unless_stopped(Duration::from_millis(self.config.idle_interval_ms)).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    warn!(event_name = "processor.claim_error", kind = %self.kind, error = %err, "claim failed, retrying after idle interval");
                    if self.wait_unless_stopped(Duration::from_millis(self.config.idle_interval_ms)).await {
                        break;
                    }
                    continue;
                }
            };

            self.events.publish(ProcessorEvent::TaskClaimed { task: task.clone(), at: self.clock.now() });
            info!(event_name = "task.claimed", task_id = %task.id, kind = %self.kind, "task claimed");

            let started_at = self.clock.now();
            let outcome = tokio::time::timeout(
                Duration::from_millis(self.config.task_handler_timeout_ms),
                self.handler.handle(&task),
            )
            .await;

            match outcome {
                Ok(Ok(())) => self.finalize_success(&task, started_at).await,
                Ok(Err(err)) => self.finalize_failure(&task, err.to_string()).await,
                Err(_elapsed) => {
                    let err = HandlerError::Timeout { id: task.id.clone() };
                    self.finalize_failure(&task, err.to_string()).await
                }
            }

            if self.wait_unless_stopped(Duration::from_millis(self.config.claim_interval_ms)).await {
                break;
            }
        }

        self.events.publish(ProcessorEvent::Stopped { kind: self.kind.clone() });
        info!(event_name = "processor.stopped", kind = %self.kind, "processor stopped");
    }

    async fn finalize_success(&self, task: &Task, started_at: chrono::DateTime<chrono::Utc>) {
        match self.backend.complete(&task.id).await {
            Ok(completed) => {
                let duration_ms = (self.clock.now() - started_at).num_milliseconds().max(0) as u64;
                info!(event_name = "task.completed", task_id = %task.id, kind = %self.kind, duration_ms, "task completed");
                self.events.publish(ProcessorEvent::TaskCompleted { task: completed, duration_ms, at: self.clock.now() });
            }
            Err(err) => {
                warn!(event_name = "processor.complete_error", task_id = %task.id, error = %err, "failed to persist completion");
            }
        }
    }

    async fn finalize_failure(&self, task: &Task, reason: String) {
        if task.retry_count + 1 > self.config.max_retries {
            match self.backend.fail(&task.id).await {
                Ok(failed) => {
                    warn!(event_name = "task.failed", task_id = %task.id, kind = %self.kind, reason = %reason, "task failed permanently");
                    self.events.publish(ProcessorEvent::TaskFailed { task: failed, reason, at: self.clock.now() });
                }
                Err(err) => {
                    warn!(event_name = "processor.fail_error", task_id = %task.id, error = %err, "failed to persist failure");
                }
            }
            return;
        }

        let delay = {
            let mut rng = self.rng.lock().await;
            self.backoff.next_delay(task.retry_count, &mut *rng)
        };
        let next_scheduled_at = self.clock.now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

        match self.backend.unclaim(&task.id, next_scheduled_at).await {
            Ok(retried) => {
                info!(event_name = "task.retry-scheduled", task_id = %task.id, kind = %self.kind, retry_count = retried.retry_count, "task retry scheduled");
                self.events.publish(ProcessorEvent::TaskRetried {
                    retry_count: retried.retry_count,
                    task: retried,
                    next_scheduled_at,
                    at: self.clock.now(),
                });
            }
            Err(err) => {
                warn!(event_name = "processor.unclaim_error", task_id = %task.id, error = %err, "failed to persist retry");
            }
        }
    }
}
