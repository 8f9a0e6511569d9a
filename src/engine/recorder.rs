//! Times one invocation and writes its execution record.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::constants::{METRIC_RULE_EXECUTION, METRIC_RULE_EXECUTION_DURATION};
use crate::engine::dispatcher::WalkOutcome;
use crate::engine::node::TriggerKind;
use crate::errors::EngineError;
use crate::metrics::SharedMetricsPublisher;
use crate::storage::execution_log::{ActionExecuted, ExecutionLogStore, ExecutionRecord};

/// What an invocation reports to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// True when the rule did not apply to the asset.
    pub fn is_skipped(&self) -> bool {
        self.result
            .as_ref()
            .and_then(|result| result.get("skipped"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Identifies the invocation a record is written for.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub rule_id: &'a str,
    pub tenant_id: &'a str,
    pub asset_id: &'a str,
    pub trigger_kind: TriggerKind,
    pub trigger_payload: &'a Value,
}

pub struct ExecutionRecorder {
    log: Arc<dyn ExecutionLogStore>,
    metrics: SharedMetricsPublisher,
}

impl ExecutionRecorder {
    pub fn new(log: Arc<dyn ExecutionLogStore>, metrics: SharedMetricsPublisher) -> Self {
        Self { log, metrics }
    }

    /// Awaits `walk` and records its outcome.
    ///
    /// Exactly one record is inserted whatever the outcome. A failed insert is
    /// logged and does not change the returned result.
    pub async fn record<F>(&self, invocation: Invocation<'_>, walk: F) -> RunResult
    where
        F: Future<Output = Result<WalkOutcome, EngineError>>,
    {
        let started_at = Utc::now();
        let started = Instant::now();

        let outcome = walk.await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let mut record = ExecutionRecord::begin(
            invocation.rule_id,
            invocation.tenant_id,
            invocation.asset_id,
            invocation.trigger_kind.as_str(),
            invocation.trigger_payload.clone(),
            started_at,
        );
        record.completed_at = Utc::now();
        record.duration_ms = duration_ms;

        let outcome_tag = match outcome {
            Ok(WalkOutcome::Completed { outputs }) => {
                record.success = true;
                record.actions_executed = outputs
                    .iter()
                    .map(|(node_id, output)| ActionExecuted {
                        node_id: node_id.clone(),
                        output: output.clone(),
                    })
                    .collect();
                record.result = Some(json!({"executed": true, "outputs": outputs}));

                info!(
                    rule.id = invocation.rule_id,
                    asset.id = invocation.asset_id,
                    execution.duration_ms = duration_ms,
                    execution.nodes = record.actions_executed.len(),
                    "Rule executed"
                );
                "success"
            }
            Ok(WalkOutcome::Skipped { reason }) => {
                record.success = true;
                record.result = Some(json!({"skipped": true, "reason": reason}));
                "skipped"
            }
            Err(e) => {
                warn!(
                    rule.id = invocation.rule_id,
                    asset.id = invocation.asset_id,
                    execution.duration_ms = duration_ms,
                    error = %e,
                    configuration_error = e.is_configuration_error(),
                    "Rule execution failed"
                );
                record.error = Some(e.to_string());
                "failure"
            }
        };

        let tags = [("outcome", outcome_tag)];
        self.metrics
            .incr_with_tags(METRIC_RULE_EXECUTION, &tags)
            .await;
        self.metrics
            .time_with_tags(METRIC_RULE_EXECUTION_DURATION, duration_ms, &tags)
            .await;

        let result = RunResult {
            success: record.success,
            result: record.result.clone(),
            error: record.error.clone(),
        };

        let execution_id = record.id.clone();
        if let Err(e) = self.log.insert(record).await {
            error!(
                execution.id = %execution_id,
                rule.id = invocation.rule_id,
                error = ?e,
                "Failed to store execution record"
            );
        }

        result
    }
}
