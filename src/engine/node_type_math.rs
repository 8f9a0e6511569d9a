//! Arithmetic over literal numbers and earlier node outputs.
//!
//! ```json
//! {
//!   "id": "m1",
//!   "type": "math",
//!   "config": {"operation": "divide", "operands": [{"nodeId": "g1"}, 2]}
//! }
//! ```
//!
//! `add` sums from 0 and `multiply` multiplies from 1. `subtract` and `divide`
//! fold left from the first operand and need at least one. Integral results are
//! emitted as JSON integers.

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::common::{as_number, number_value};
use crate::engine::context::ExecutionContext;
use crate::engine::node::{MathConfig, MathOperation, Operand};
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

#[derive(Debug, Default)]
pub struct MathEvaluator;

impl MathEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn resolve(operand: &Operand, context: &ExecutionContext) -> Result<f64, EngineError> {
        match operand {
            Operand::Value(value) => as_number(value).ok_or_else(|| EngineError::NonNumericOperand {
                operand: value.to_string(),
            }),
            Operand::NodeOutput(node_id) => context
                .output(node_id)
                .and_then(as_number)
                .ok_or_else(|| EngineError::NonNumericOperand {
                    operand: format!(
                        "output of {} ({})",
                        node_id,
                        context.output(node_id).unwrap_or(&Value::Null)
                    ),
                }),
        }
    }
}

#[async_trait]
impl NodeEvaluator for MathEvaluator {
    type Config = MathConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &MathConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let values = config
            .operands
            .iter()
            .map(|operand| Self::resolve(operand, context))
            .collect::<Result<Vec<f64>, _>>()?;

        let result = match config.operation {
            MathOperation::Add => values.iter().sum(),
            MathOperation::Multiply => values.iter().product(),
            MathOperation::Subtract | MathOperation::Divide => {
                let (first, rest) =
                    values
                        .split_first()
                        .ok_or_else(|| EngineError::EmptyOperands {
                            node_id: node_id.to_string(),
                            operation: config.operation.as_str().to_string(),
                        })?;

                let mut acc = *first;
                for value in rest {
                    if config.operation == MathOperation::Subtract {
                        acc -= value;
                    } else if *value == 0.0 {
                        return Err(EngineError::DivisionByZero {
                            node_id: node_id.to_string(),
                        });
                    } else {
                        acc /= value;
                    }
                }
                acc
            }
        };

        number_value(result).ok_or_else(|| EngineError::NonNumericOperand {
            operand: result.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_asset, test_context};
    use serde_json::json;

    fn config(operation: MathOperation, operands: Vec<Operand>) -> MathConfig {
        MathConfig {
            operation,
            operands,
        }
    }

    fn literals(values: &[Value]) -> Vec<Operand> {
        values.iter().cloned().map(Operand::Value).collect()
    }

    async fn run(operation: MathOperation, operands: Vec<Operand>) -> Result<Value, EngineError> {
        let mut context = test_context(test_asset());
        context.record_output("g1", json!(8));
        context.record_output("text", json!("eight"));
        MathEvaluator::new()
            .evaluate("m1", &config(operation, operands), &context)
            .await
    }

    #[tokio::test]
    async fn test_operations() {
        assert_eq!(
            run(MathOperation::Add, literals(&[json!(2), json!(3)])).await.unwrap(),
            json!(5)
        );
        assert_eq!(
            run(MathOperation::Divide, literals(&[json!(10), json!(2)])).await.unwrap(),
            json!(5)
        );
        assert_eq!(
            run(MathOperation::Subtract, literals(&[json!(10), json!(2), json!(3)]))
                .await
                .unwrap(),
            json!(5)
        );
        assert_eq!(
            run(MathOperation::Multiply, literals(&[json!(1.5), json!(3)])).await.unwrap(),
            json!(4.5)
        );
    }

    #[tokio::test]
    async fn test_empty_operands() {
        assert_eq!(run(MathOperation::Add, vec![]).await.unwrap(), json!(0));
        assert_eq!(run(MathOperation::Multiply, vec![]).await.unwrap(), json!(1));
        assert!(matches!(
            run(MathOperation::Subtract, vec![]).await,
            Err(EngineError::EmptyOperands { .. })
        ));
    }

    #[tokio::test]
    async fn test_node_output_operands() {
        let operands = vec![Operand::NodeOutput("g1".to_string()), Operand::Value(json!(2))];
        assert_eq!(run(MathOperation::Divide, operands).await.unwrap(), json!(4));

        let err = run(
            MathOperation::Add,
            vec![Operand::NodeOutput("text".to_string())],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::NonNumericOperand { .. }));

        let err = run(
            MathOperation::Add,
            vec![Operand::NodeOutput("never-ran".to_string())],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::NonNumericOperand { .. }));
    }

    #[tokio::test]
    async fn test_non_numeric_literal_and_division_by_zero() {
        assert!(matches!(
            run(MathOperation::Add, literals(&[json!(1), json!("2")])).await,
            Err(EngineError::NonNumericOperand { .. })
        ));
        assert!(matches!(
            run(MathOperation::Divide, literals(&[json!(1), json!(0)])).await,
            Err(EngineError::DivisionByZero { .. })
        ));
    }
}
