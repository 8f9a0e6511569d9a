//! Formula transform.
//!
//! ```json
//! {"id": "f1", "type": "formula", "config": {"formula": "telemetry.pressure / 2 + attributes.depth"}}
//! ```
//!
//! The output is the computed value; evaluation failures fail the walk.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::computed::{ComputedFieldEvaluator, FieldDefinition};
use crate::engine::context::ExecutionContext;
use crate::engine::node::FormulaConfig;
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

/// Evaluates an ad-hoc formula through the computed-field evaluator.
///
/// The formula is wrapped in a throwaway field definition keyed by the node id.
/// The evaluator reads the asset's stored state, not the walk's snapshot.
pub struct FormulaEvaluator {
    computed: Arc<dyn ComputedFieldEvaluator>,
}

impl FormulaEvaluator {
    pub fn new(computed: Arc<dyn ComputedFieldEvaluator>) -> Self {
        Self { computed }
    }
}

#[async_trait]
impl NodeEvaluator for FormulaEvaluator {
    type Config = FormulaConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &FormulaConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let field = FieldDefinition {
            key: node_id.to_string(),
            name: node_id.to_string(),
            formula: config.formula.clone(),
            recalculate_on: vec![],
        };

        let computed = self
            .computed
            .evaluate(&context.tenant_id, &context.asset_id, &field)
            .await?;
        Ok(computed.value)
    }
}
