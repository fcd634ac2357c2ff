//! Bootstrap and CLI for the event-driven trigger service: wires the
//! Redis-backed state store, rule repository, context window manager,
//! trigger mode controller, LLM engine, and notification pipeline into
//! one running process driven by an AMQP event consumer, plus the
//! periodic tick that keeps batch/interval rules honest between
//! events. Same shape as the teacher's `wf-cli` + `wf-runtime::lifecycle`
//! (clap subcommand → bootstrap → spawn task groups → wait for signal
//! → drain), narrowed to this service's own components.

mod rule_updates;
mod signal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use trigger_broker::{Disposition, EventConsumer, MessageHandler};
use trigger_config::{trg_error, trg_info, trg_warn, TriggerConfig};
use trigger_core::{tick, EventHandler, ExecutionSink, JsonlExecutionSink, NullExecutionSink, TriggerMetrics};
use trigger_llm::{LlmEngine, LlmEngineConfig};
use trigger_notify::{LoggingChannel, NotificationWorker, NotifyWorkerConfig};
use trigger_repo::{watch_invalidations, RuleRepository};
use trigger_store::{RedisStore, StateStore};
use trigger_tmc::TriggerModeController;
use trigger_types::Event;
use trigger_window::ContextWindowManager;

const RULE_UPDATE_CHANNEL: &str = "trigger:rules:update";
const TICK_PERIOD: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "trigger-engine", about = "Event-driven trigger service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trigger service: broker consumer, rule evaluation,
    /// and the notification worker.
    Run {
        /// Path to trigger.toml
        #[arg(short, long)]
        config: PathBuf,
        /// Optional JSONL path for execution records (spec.md §3, §9);
        /// omit to drop them, matching spec.md's "persistence is
        /// unspecified" framing.
        #[arg(long)]
        execution_log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, execution_log } => run(config, execution_log).await,
    }
}

async fn run(config_path: PathBuf, execution_log: Option<PathBuf>) -> Result<()> {
    let config_path = config_path
        .canonicalize()
        .with_context(|| format!("config path '{}'", config_path.display()))?;
    let config = TriggerConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .expect("config path must have a parent directory");
    let _log_guard = trigger_config::tracing_init::init_tracing(&config.logging, base_dir)?;

    let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let repo = Arc::new(RuleRepository::new(Arc::clone(&store)));
    let window = ContextWindowManager::new(
        Arc::clone(&store),
        config.context_max_events,
        config.context_window_seconds,
    );
    let tmc = Arc::new(TriggerModeController::new(Arc::clone(&store)));
    let llm = Arc::new(LlmEngine::new(
        Arc::clone(&store),
        LlmEngineConfig {
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            timeout: config.openai_timeout.into(),
        },
    ));

    let sink: Arc<dyn ExecutionSink> = match execution_log {
        Some(path) => Arc::new(JsonlExecutionSink::open(&path).with_context(|| {
            format!("opening execution log at '{}'", path.display())
        })?),
        None => Arc::new(NullExecutionSink),
    };
    let metrics = Arc::new(TriggerMetrics::new());

    let handler = Arc::new(EventHandler::new(
        Arc::clone(&store),
        Arc::clone(&repo),
        window,
        Arc::clone(&tmc),
        Arc::clone(&llm),
        sink,
        Arc::clone(&metrics),
    ));

    let cancel = CancellationToken::new();
    let mut background = Vec::new();

    match rule_updates::RedisInvalidationHint::subscribe(&config.redis_url, RULE_UPDATE_CHANNEL).await {
        Ok(hint) => {
            let repo = Arc::clone(&repo);
            background.push(tokio::spawn(async move {
                watch_invalidations(repo, hint).await;
            }));
        }
        Err(e) => {
            trg_warn!(sys, error = %e, "rule-update pub/sub unavailable, relying on version polling only");
        }
    }

    {
        let tmc = Arc::clone(&tmc);
        let handler = Arc::clone(&handler);
        let metrics = Arc::clone(&metrics);
        let cancel = cancel.clone();
        background.push(tokio::spawn(async move {
            tick::run(tmc, handler, metrics, TICK_PERIOD, cancel).await;
        }));
    }

    {
        let channel: Arc<dyn trigger_notify::NotificationChannel> = Arc::new(LoggingChannel);
        let worker = NotificationWorker::new(
            Arc::clone(&store),
            channel,
            cancel.clone(),
            NotifyWorkerConfig {
                max_retry: config.notification_max_retry,
                ..Default::default()
            },
        );
        background.push(tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                trg_error!(sys, error = %e, "notification worker exited with error");
            }
        }));
    }

    let consumer = EventConsumer::connect(&config.rabbitmq_url, &config.rabbitmq_queue).await?;
    let adapter = Arc::new(HandlerAdapter {
        handler: Arc::clone(&handler),
    });
    let broker_cancel = cancel.clone();
    let broker_task = tokio::spawn(async move {
        if let Err(e) = consumer.run(adapter, broker_cancel).await {
            trg_error!(sys, error = %e, "broker consumer exited with error");
        }
    });

    trg_info!(
        sys,
        queue = %config.rabbitmq_queue,
        "trigger-engine listening"
    );

    signal::wait_for_signal(cancel.clone()).await;

    broker_task.await.ok();
    for task in background {
        task.await.ok();
    }

    Ok(())
}

/// Adapts [`EventHandler`] to [`MessageHandler`] — the only place the
/// broker and core-pipeline crates meet, kept here rather than in
/// either library crate so neither depends on the other.
struct HandlerAdapter<S: StateStore> {
    handler: Arc<EventHandler<S>>,
}

#[async_trait]
impl<S: StateStore + 'static> MessageHandler for HandlerAdapter<S> {
    async fn handle(&self, event: Event) -> Disposition {
        match self.handler.handle(&event).await {
            Ok(_) => Disposition::Ack,
            Err(e) => {
                trg_error!(sys, error = %e, event_id = %event.event_id, "event handler failed, nacking for redelivery");
                Disposition::NackRequeue
            }
        }
    }
}
