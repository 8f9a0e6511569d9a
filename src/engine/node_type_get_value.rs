//! Nodes that read the asset snapshot: `get_telemetry` and `get_attribute`.
//!
//! Both read the snapshot loaded at walk start. A value written by a `set_*`
//! action earlier in the same walk is not visible here.

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::node::{GetAttributeConfig, GetTelemetryConfig};
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

/// Outputs the current value of a telemetry key, or `null` when absent.
/// Entries stored as `{"value": ..., "timestamp": ...}` are unwrapped.
#[derive(Debug, Default)]
pub struct GetTelemetryEvaluator;

impl GetTelemetryEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeEvaluator for GetTelemetryEvaluator {
    type Config = GetTelemetryConfig;

    async fn evaluate(
        &self,
        _node_id: &str,
        config: &GetTelemetryConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        Ok(context
            .asset
            .telemetry_value(&config.telemetry_key)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// Outputs the current value of an attribute, or `null` when absent.
#[derive(Debug, Default)]
pub struct GetAttributeEvaluator;

impl GetAttributeEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeEvaluator for GetAttributeEvaluator {
    type Config = GetAttributeConfig;

    async fn evaluate(
        &self,
        _node_id: &str,
        config: &GetAttributeConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        Ok(context
            .asset
            .attribute(&config.attribute_key)
            .cloned()
            .unwrap_or(Value::Null))
    }
}
