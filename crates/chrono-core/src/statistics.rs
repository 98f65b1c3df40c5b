//! Periodic read-only statistics sampler.
//!
//! Same control-loop shape as `SimpleProcessor`, reduced to a single
//! no-side-effect operation per tick. Failures never halt the collector;
//! a backend that doesn't implement `collect_statistics` disables it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::backend::{Backend, BackendError};
use crate::clock::Clock;
use crate::events::{EventBus, StatisticsEvent};
use crate::task::Kind;

#[derive(Clone, Copy, Debug)]
pub struct StatisticsCollectorConfig {
    pub stat_collection_interval_ms: u64,
}

impl Default for StatisticsCollectorConfig {
    fn default() -> Self {
        Self { stat_collection_interval_ms: 1_800_000 }
    }
}

pub struct StatisticsCollector<B: Backend + 'static> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    config: StatisticsCollectorConfig,
    events: EventBus<StatisticsEvent>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Backend + 'static> StatisticsCollector<B> {
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>, config: StatisticsCollectorConfig) -> Arc<Self> {
        Arc::new(Self {
            backend,
            clock,
            config,
            events: EventBus::default(),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            join_handle: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatisticsEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Idempotent: a second call while running is a no-op.
    pub async fn start(self: &Arc<Self>, task_kinds: Vec<Kind>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.run_loop(task_kinds).await });
        *self.join_handle.lock().await = Some(handle);
    }

    /// Idempotent.
    pub async fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let handle = self.join_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run_loop(self: Arc<Self>, task_kinds: Vec<Kind>) {
        let mut disabled = false;

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            if !disabled {
                match self.backend.collect_statistics(&task_kinds).await {
                    Ok(statistics) => {
                        self.events.publish(StatisticsEvent::Sampled { statistics, at: self.clock.now() });
                    }
                    Err(BackendError::Unsupported) => {
                        self.events.publish(StatisticsEvent::Unsupported);
                        disabled = true;
                    }
                    Err(err) => {
                        warn!(event_name = "statisticsCollectedError", error = %err, "statistics collection failed");
                        self.events.publish(StatisticsEvent::CollectionFailed { error: err.to_string(), at: self.clock.now() });
                    }
                }
            }

            let stop = tokio::select! {
                _ = self.clock.sleep(Duration::from_millis(self.config.stat_collection_interval_ms)) => {
                    self.stop_requested.load(Ordering::SeqCst)
                }
                _ = self.stop_notify.notified() => true,
            };
            if stop {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_thirty_minutes() {
        assert_eq!(StatisticsCollectorConfig::default().stat_collection_interval_ms, 1_800_000);
    }
}
