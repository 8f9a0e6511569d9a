//! Computed-field evaluation used by `formula` nodes.

use crate::engine::context::build_scope;
use crate::engine::expression::Expression;
use crate::errors::EngineError;
use crate::storage::asset::AssetRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Definition of a field computed from an asset's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub key: String,
    pub name: String,
    pub formula: String,
    /// Telemetry or attribute keys whose change should trigger recalculation
    #[serde(default)]
    pub recalculate_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedFieldValue {
    pub value: Value,
    pub calculated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ComputedFieldEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        tenant_id: &str,
        asset_id: &str,
        field: &FieldDefinition,
    ) -> Result<ComputedFieldValue, EngineError>;
}

#[async_trait]
impl<T: ComputedFieldEvaluator + ?Sized> ComputedFieldEvaluator for Arc<T> {
    async fn evaluate(
        &self,
        tenant_id: &str,
        asset_id: &str,
        field: &FieldDefinition,
    ) -> Result<ComputedFieldValue, EngineError> {
        self.as_ref().evaluate(tenant_id, asset_id, field).await
    }
}

/// Evaluates formulas with the rule expression language against the asset's
/// current stored state.
pub struct ExpressionComputedFieldEvaluator {
    assets: Arc<dyn AssetRepository>,
}

impl ExpressionComputedFieldEvaluator {
    pub fn new(assets: Arc<dyn AssetRepository>) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl ComputedFieldEvaluator for ExpressionComputedFieldEvaluator {
    async fn evaluate(
        &self,
        tenant_id: &str,
        asset_id: &str,
        field: &FieldDefinition,
    ) -> Result<ComputedFieldValue, EngineError> {
        let asset = self
            .assets
            .find_by_id(tenant_id, asset_id)
            .await?
            .ok_or_else(|| EngineError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;

        let value = Expression::parse(&field.formula)
            .and_then(|expression| expression.evaluate(&build_scope(&asset)))
            .map_err(|e| EngineError::FormulaFailed {
                formula: field.formula.clone(),
                details: e.to_string(),
            })?;

        debug!(
            asset.id = asset_id,
            field.key = %field.key,
            "Computed field evaluated"
        );

        Ok(ComputedFieldValue {
            value,
            calculated_at: Utc::now(),
        })
    }
}
