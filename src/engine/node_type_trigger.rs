//! Trigger nodes: the entry point of every walk.
//!
//! A rule starts at its first trigger node in node-list order. The trigger's
//! output is the payload of the event that started the walk, so downstream
//! nodes can reference it by the trigger's node id.
//!
//! ```json
//! {"id": "t1", "type": "telemetry_change", "config": {"telemetryKey": "pressure"}}
//! ```
//!
//! The optional `telemetryKey` / `attributeKey` filters are applied when
//! events are matched to rules, not during the walk.

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::node::TriggerConfig;
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

/// Evaluator for the five trigger kinds. Outputs the trigger payload unchanged.
#[derive(Debug, Default)]
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeEvaluator for TriggerEvaluator {
    type Config = TriggerConfig;

    async fn evaluate(
        &self,
        _node_id: &str,
        _config: &TriggerConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        Ok(context.trigger_payload.clone())
    }
}
