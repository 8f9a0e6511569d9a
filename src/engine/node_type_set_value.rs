//! Actions that write back to the asset: `set_computed`, `set_attribute` and
//! `set_status`.
//!
//! All three output `null`. Attribute and computed writes replace the whole
//! map on the repository, built from the walk's snapshot plus every write
//! staged earlier in the same walk.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::engine::context::ExecutionContext;
use crate::engine::node::{SetAttributeConfig, SetComputedConfig, SetStatusConfig, ValueSource};
use crate::errors::EngineError;
use crate::storage::asset::{AssetRepository, AssetUpdate};

use super::evaluator::NodeEvaluator;

fn resolve(source: &ValueSource, context: &ExecutionContext) -> Value {
    match source {
        ValueSource::Literal(value) => value.clone(),
        ValueSource::NodeOutput(Some(node_id)) => {
            context.output(node_id).cloned().unwrap_or(Value::Null)
        }
        ValueSource::NodeOutput(None) => Value::Null,
    }
}

pub struct SetComputedEvaluator {
    assets: Arc<dyn AssetRepository>,
}

impl SetComputedEvaluator {
    pub fn new(assets: Arc<dyn AssetRepository>) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl NodeEvaluator for SetComputedEvaluator {
    type Config = SetComputedConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &SetComputedConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let entry = json!({
            "value": resolve(&config.value, context),
            "calculatedAt": Utc::now(),
            "source": "rule",
        });
        let computed = context.stage_computed(&config.field, entry);

        self.assets
            .update_computed_values(&context.tenant_id, &context.asset_id, computed)
            .await?;

        debug!(
            rule.id = %context.rule_id,
            node.id = node_id,
            field = %config.field,
            "Computed value set"
        );
        Ok(Value::Null)
    }
}

pub struct SetAttributeEvaluator {
    assets: Arc<dyn AssetRepository>,
}

impl SetAttributeEvaluator {
    pub fn new(assets: Arc<dyn AssetRepository>) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl NodeEvaluator for SetAttributeEvaluator {
    type Config = SetAttributeConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &SetAttributeConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let attributes = context.stage_attribute(&config.attribute, resolve(&config.value, context));

        self.assets
            .update(
                &context.tenant_id,
                &context.asset_id,
                AssetUpdate::attributes(attributes),
            )
            .await?;

        debug!(
            rule.id = %context.rule_id,
            node.id = node_id,
            attribute = %config.attribute,
            "Attribute set"
        );
        Ok(Value::Null)
    }
}

pub struct SetStatusEvaluator {
    assets: Arc<dyn AssetRepository>,
}

impl SetStatusEvaluator {
    pub fn new(assets: Arc<dyn AssetRepository>) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl NodeEvaluator for SetStatusEvaluator {
    type Config = SetStatusConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &SetStatusConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        self.assets
            .update(
                &context.tenant_id,
                &context.asset_id,
                AssetUpdate::status(config.status.as_str()),
            )
            .await?;

        debug!(
            rule.id = %context.rule_id,
            node.id = node_id,
            status = %config.status,
            "Asset status set"
        );
        Ok(Value::Null)
    }
}
