use anyhow::{Context, Result};
use assetrules::{
    config::{Config, ExecutionLogStorageType, version},
    consumer::{RuleEvent, RuleEventConsumer},
    engine::{EngineSettings, RuleEngine},
    errors::ConsumerError,
    metrics::create_metrics_publisher,
    storage::{
        AssetSnapshot, ExecutionLogStore, FilesystemExecutionLogStore, InMemoryAssetRepository,
        InMemoryExecutionLogStore, InMemoryRuleStore, NoopExecutionLogStore, Rule,
        TracingExecutionLogStore,
    },
    tasks::{spawn_cancellable_task, spawn_managed_task},
    validation::Validator,
};
use std::{env, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let version = version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{}", version);
            std::process::exit(0);
        }
    });

    let config = Config::new()?;

    let env_filter = tracing_subscriber::EnvFilter::new(
        env::var("RUST_LOG").unwrap_or_else(|_| "assetrules=info".into()),
    );

    let fmt_layer = if env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_thread_ids(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(version = %version, "Starting assetrules");

    let rules = load_rules(&config.rules_path).await?;
    let assets: Vec<AssetSnapshot> = load_json(&config.assets_path).await?;
    tracing::info!(
        rules = rules.len(),
        assets = assets.len(),
        "Loaded rules and assets"
    );

    let rule_store = Arc::new(InMemoryRuleStore::with_rules(rules.clone()));
    let asset_repository = Arc::new(InMemoryAssetRepository::with_assets(assets));

    let memory_log = Arc::new(InMemoryExecutionLogStore::new());
    let execution_log: Arc<dyn ExecutionLogStore> = match config.execution_log.storage_type {
        ExecutionLogStorageType::Filesystem => {
            let base_dir = config
                .execution_log
                .filesystem_base_directory
                .as_ref()
                .context("EXECUTION_LOG_DIRECTORY must be set for filesystem storage")?;
            tracing::info!(base_dir = %base_dir, "Using filesystem execution log storage");
            Arc::new(FilesystemExecutionLogStore::new(base_dir))
        }
        ExecutionLogStorageType::Memory => {
            tracing::info!("Using in-memory execution log storage");
            memory_log.clone()
        }
        ExecutionLogStorageType::Noop => {
            tracing::info!("Using no-op execution log storage");
            Arc::new(NoopExecutionLogStore::new())
        }
        ExecutionLogStorageType::Tracing => {
            tracing::info!("Using tracing execution log storage");
            Arc::new(TracingExecutionLogStore::new())
        }
    };

    let metrics = create_metrics_publisher(
        config.metrics_statsd_host.as_deref(),
        &config.metrics_prefix,
    )?;

    let engine = RuleEngine::builder(rule_store, asset_repository)
        .execution_log(execution_log)
        .metrics(metrics.clone())
        .settings(EngineSettings::from(&config))
        .build();

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let (sender, receiver) = mpsc::channel::<RuleEvent>(*config.event_queue_size.as_ref());

    spawn_cancellable_task(&tracker, token.clone(), "event_reader", |cancel_token| async move {
        read_events(sender, cancel_token).await?;
        Ok(())
    });

    {
        let consumer = RuleEventConsumer::new(engine, receiver, token.clone(), metrics);
        let shutdown_token = token.clone();
        spawn_managed_task(&tracker, token.clone(), "rule_event_consumer", async move {
            consumer.run().await?;
            // Input exhausted; let the signal handler wind down too.
            shutdown_token.cancel();
            Ok(())
        });
    }

    {
        let signal_token = token.clone();
        tracker.spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!(error = ?e, "Failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                () = signal_token.cancelled() => {
                    tracing::debug!("Signal handler task shutting down");
                },
                _ = terminate => {
                    tracing::info!("Received SIGTERM signal, initiating shutdown");
                },
                _ = ctrl_c => {
                    tracing::info!("Received Ctrl+C signal, initiating shutdown");
                },
            }

            signal_token.cancel();
        });
    }

    tracker.close();
    tracker.wait().await;

    if config.execution_log.storage_type == ExecutionLogStorageType::Memory {
        for rule in &rules {
            let stats = memory_log.stats(&rule.tenant_id, &rule.id).await?;
            tracing::info!(
                rule.id = %rule.id,
                executions.total = stats.total,
                executions.succeeded = stats.succeeded,
                executions.failed = stats.failed,
                executions.average_duration_ms = stats.average_duration_ms,
                "Execution summary"
            );
        }
    }

    tracing::info!("All tasks completed, shutting down");
    Ok(())
}

async fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path))
}

/// Loads rules, dropping active rules whose graph does not validate.
async fn load_rules(path: &str) -> Result<Vec<Rule>> {
    let rules: Vec<Rule> = load_json(path).await?;
    Ok(rules
        .into_iter()
        .filter(|rule| {
            if !rule.is_active() {
                return true;
            }
            match Validator::validate_rule(rule) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(rule.id = %rule.id, error = %e, "Skipping invalid rule");
                    false
                }
            }
        })
        .collect())
}

/// Reads JSON-lines events from stdin until EOF or cancellation. Lines that
/// fail to parse are logged and skipped.
async fn read_events(
    sender: mpsc::Sender<RuleEvent>,
    cancel_token: CancellationToken,
) -> Result<(), ConsumerError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = cancel_token.cancelled() => break,
            line = lines.next_line() => line.map_err(|e| ConsumerError::InputFailed {
                details: format!("stdin: {}", e),
            })?,
        };

        let Some(line) = line else {
            tracing::info!("Event input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match RuleEvent::parse(&line) {
            Ok(event) => {
                if sender.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping malformed event"),
        }
    }

    Ok(())
}
