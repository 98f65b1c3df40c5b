//! `chrono-cli` — the embedding program demonstrating the runtime end to end.
//!
//! Grounded on `cli::Cli` (`clap::Parser`/`Subcommand` shape) and
//! `server::main::{init_logging, run, wait_for_shutdown}`. Not part of the
//! core: config loading, logging initialization, and `ctrl_c` shutdown are
//! embedding-program concerns per the external-interfaces contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_core::{
    BackoffStrategy, Chrono, Exponential, HandlerError, Jitter, LogFormat, ProcessorConfig, RuntimeConfig,
    ScheduleInput, SystemClock, Task, TaskHandler,
};
use chrono_memory::InMemoryBackend;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "chrono", about = "Durable, pluggable task-scheduling runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boots an in-memory backend, registers a demo handler, and runs until ctrl-c.
    Run {
        #[arg(long, default_value = "demo.echo")]
        kind: String,
    },
    /// Schedules one task against a throwaway in-process orchestrator and exits.
    Schedule {
        #[arg(long)]
        kind: String,
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long, default_value_t = 0)]
        delay_secs: i64,
    },
}

struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        info!(event_name = "demo.handler.invoked", task_id = %task.id, data = %task.data, "echoing task");
        Ok(())
    }
}

fn init_logging(config: &RuntimeConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::load(Default::default())?;
    init_logging(&config);

    match cli.command {
        Command::Run { kind } => run_demo(kind, &config).await,
        Command::Schedule { kind, data, delay_secs } => schedule_once(kind, data, delay_secs, &config).await,
    }
}

async fn run_demo(kind: String, config: &RuntimeConfig) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let orchestrator = Chrono::new(backend, clock.clone());

    let backoff: Arc<dyn BackoffStrategy> =
        Arc::new(Exponential::new(config.defaults.claim_interval_ms, 30_000).with_jitter(Jitter::Equal));
    let processor_config = ProcessorConfig {
        claim_interval_ms: config.defaults.claim_interval_ms,
        idle_interval_ms: config.defaults.idle_interval_ms,
        task_handler_timeout_ms: config.defaults.task_handler_timeout_ms,
        claim_stale_timeout_ms: config.defaults.claim_stale_timeout_ms,
        max_retries: config.defaults.max_retries,
    };

    orchestrator
        .register_task_handler(kind.as_str(), Arc::new(EchoHandler), backoff, processor_config)
        .await?;

    for i in 0..3 {
        orchestrator
            .schedule_task(ScheduleInput::new(kind.as_str(), serde_json::json!({"seq": i}), Utc::now()))
            .await?;
    }

    orchestrator.start().await?;
    info!(event_name = "system.cli.started", kind = %kind, "chrono demo running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!(event_name = "system.cli.shutdown_signal", "shutdown signal received");
    orchestrator.stop().await?;
    Ok(())
}

async fn schedule_once(kind: String, data: String, delay_secs: i64, _config: &RuntimeConfig) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let orchestrator = Chrono::new(backend, clock);

    let data_value: serde_json::Value = serde_json::from_str(&data)?;
    let when = Utc::now() + chrono::Duration::seconds(delay_secs.max(0));

    let task = orchestrator.schedule_task(ScheduleInput::new(kind.as_str(), data_value, when)).await?;
    info!(event_name = "system.cli.scheduled", task_id = %task.id, kind = %kind, "task scheduled");
    Ok(())
}
