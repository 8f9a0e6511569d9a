//! Condition node.
//!
//! Evaluates a restricted expression against the asset snapshot and outputs a
//! boolean. By default the walk continues into the node's successors whatever
//! the result; rules opt into branching with the `branchOnFalse` setting.
//!
//! ```json
//! {"id": "c1", "type": "if", "config": {"expression": "telemetry.pressure > 500"}}
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::engine::expression::Expression;
use crate::engine::node::ConditionConfig;
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

/// Evaluator for `if` nodes.
///
/// Parse and evaluation errors are logged at `warn` and read as `false`; a
/// broken condition never fails the walk.
#[derive(Debug, Default)]
pub struct IfEvaluator;

impl IfEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeEvaluator for IfEvaluator {
    type Config = ConditionConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &ConditionConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let result = Expression::parse(&config.expression)
            .and_then(|expression| expression.evaluate_bool(context.scope()));

        match result {
            Ok(matched) => Ok(Value::Bool(matched)),
            Err(e) => {
                tracing::warn!(
                    rule.id = %context.rule_id,
                    node.id = node_id,
                    expression = %config.expression,
                    error = %e,
                    "Condition evaluation failed, treating as false"
                );
                Ok(Value::Bool(false))
            }
        }
    }
}
