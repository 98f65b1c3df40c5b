//! Handler registry and lifecycle orchestrator.
//!
//! Grounded on `server::bootstrap`'s "wire several runtime pieces behind one
//! struct, then `app.slack_runner.start()`" pattern, generalized from one
//! fixed runner to one `SimpleProcessor` per registered kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::backoff::BackoffStrategy;
use crate::clock::Clock;
use crate::error::ChronoError;
use crate::events::{ChronoEvent, EventBus};
use crate::processor::{ProcessorConfig, SimpleProcessor, TaskHandler};
use crate::task::{DeleteKey, Kind, ScheduleInput, Task};

/// Holds a handler registry keyed by kind and instantiates one
/// `SimpleProcessor` per registered kind.
pub struct Chrono<B: Backend + 'static> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    processors: RwLock<HashMap<Kind, Arc<SimpleProcessor<B>>>>,
    started: AtomicBool,
    events: EventBus<ChronoEvent>,
}

impl<B: Backend + 'static> Chrono<B> {
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            clock,
            processors: RwLock::new(HashMap::new()),
            started: AtomicBool::new(false),
            events: EventBus::default(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChronoEvent> {
        self.events.subscribe()
    }

    /// Registers a handler for `kind`, instantiating its processor.
    /// Permitted only before `start()`; duplicate registration is an error.
    pub async fn register_task_handler(
        &self,
        kind: impl Into<Kind>,
        handler: Arc<dyn TaskHandler>,
        backoff: Arc<dyn BackoffStrategy>,
        config: ProcessorConfig,
    ) -> Result<Arc<SimpleProcessor<B>>, ChronoError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(ChronoError::RegistrationAfterStart);
        }

        let kind = kind.into();
        let mut processors = self.processors.write().await;
        if processors.contains_key(&kind) {
            return Err(ChronoError::DuplicateRegistration(kind.0));
        }

        let processor = SimpleProcessor::new(
            kind.clone(),
            Arc::clone(&self.backend),
            handler,
            backoff,
            Arc::clone(&self.clock),
            config,
        )?;

        processors.insert(kind, Arc::clone(&processor));
        Ok(processor)
    }

    pub async fn schedule_task(&self, input: ScheduleInput) -> Result<Task, ChronoError> {
        let kind = input.kind.clone();
        let task = self.backend.schedule(input).await?;
        self.events.publish(ChronoEvent::TaskScheduled { id: task.id.clone(), kind });
        Ok(task)
    }

    pub async fn delete_task(&self, key: DeleteKey, force: bool) -> Result<Option<Task>, ChronoError> {
        let deleted = self.backend.delete(key, force).await?;
        if let Some(task) = &deleted {
            self.events.publish(ChronoEvent::TaskDeleted { id: task.id.clone() });
        }
        Ok(deleted)
    }

    /// Starts every registered processor concurrently. If any fails to
    /// start, stops those already started (also concurrently) and surfaces
    /// the error.
    pub async fn start(&self) -> Result<(), ChronoError> {
        self.started.store(true, Ordering::SeqCst);
        let processors = self.processors.read().await;

        let mut starting = JoinSet::new();
        for processor in processors.values() {
            let processor = Arc::clone(processor);
            starting.spawn(async move {
                let result = processor.start().await;
                (processor, result)
            });
        }

        let mut started = Vec::new();
        let mut failure = None;
        while let Some(outcome) = starting.join_next().await {
            let (processor, result) = outcome.expect("processor start task panicked");
            match result {
                Ok(()) => started.push(processor),
                Err(err) if failure.is_none() => failure = Some((processor.kind().0.clone(), err)),
                Err(_) => {}
            }
        }

        if let Some((kind, err)) = failure {
            warn!(event_name = "chrono.start_failed", kind = %kind, error = %err, "stopping already-started processors");
            let mut stopping = JoinSet::new();
            for processor in started {
                stopping.spawn(async move { processor.stop().await });
            }
            while stopping.join_next().await.is_some() {}
            return Err(ChronoError::StartFailed { kind, source: Box::new(err) });
        }

        self.events.publish(ChronoEvent::Started);
        info!(event_name = "chrono.started", processor_count = processors.len(), "orchestrator started");
        Ok(())
    }

    /// Stops every registered processor concurrently.
    pub async fn stop(&self) -> Result<(), ChronoError> {
        let processors = self.processors.read().await;

        let mut stopping = JoinSet::new();
        for processor in processors.values() {
            let processor = Arc::clone(processor);
            stopping.spawn(async move { (processor.kind().0.clone(), processor.stop().await) });
        }

        let mut first_error = None;
        while let Some(outcome) = stopping.join_next().await {
            let (kind, result) = outcome.expect("processor stop task panicked");
            if let Err(err) = result {
                warn!(event_name = "chrono.stop_error", kind = %kind, error = %err, "processor stop failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        self.started.store(false, Ordering::SeqCst);

        match first_error {
            None => {
                self.events.publish(ChronoEvent::Stopped);
                info!(event_name = "chrono.stopped", "orchestrator stopped");
                Ok(())
            }
            Some(err) => {
                self.events.publish(ChronoEvent::StopAborted { reason: err.to_string() });
                Err(err)
            }
        }
    }
}
