//! Log action.
//!
//! Emits one `tracing` event at the configured level, carrying the rule, the
//! asset and every output recorded so far in the walk.
//!
//! ```json
//! {"id": "l1", "type": "log", "config": {"message": "Pressure checked", "level": "warn"}}
//! ```
//!
//! `message` defaults to "Rule execution log" and `level` to `info`.

use async_trait::async_trait;
use ordermap::OrderMap;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::engine::context::ExecutionContext;
use crate::engine::node::{LogConfig, LogLevel};
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

/// Emits a structured log event carrying every output recorded so far.
#[derive(Debug, Default)]
pub struct LogEvaluator;

impl LogEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeEvaluator for LogEvaluator {
    type Config = LogConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &LogConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let outputs = render_outputs(context.outputs());

        macro_rules! emit {
            ($level:ident) => {
                $level!(
                    rule.id = %context.rule_id,
                    asset.id = %context.asset_id,
                    node.id = node_id,
                    outputs = %outputs,
                    "{}",
                    config.message
                )
            };
        }

        match config.level {
            LogLevel::Debug => emit!(debug),
            LogLevel::Info => emit!(info),
            LogLevel::Warn => emit!(warn),
            LogLevel::Error => emit!(error),
        }
        Ok(Value::Null)
    }
}

/// Compact JSON of the outputs, or their debug form if they cannot be encoded.
fn render_outputs(outputs: &OrderMap<String, Value>) -> String {
    serde_json::to_string(outputs).unwrap_or_else(|_| format!("{:?}", outputs))
}
