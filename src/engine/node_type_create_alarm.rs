//! Alarm action.
//!
//! ```json
//! {
//!   "id": "a1",
//!   "type": "create_alarm",
//!   "config": {"alarmCode": "HP-1", "name": "High pressure", "severity": "HIGH"}
//! }
//! ```
//!
//! `severity` defaults to `MEDIUM`; `message` is optional.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::alarm::{AlarmRequest, AlarmSink};
use crate::engine::context::ExecutionContext;
use crate::engine::node::CreateAlarmConfig;
use crate::errors::EngineError;

use super::evaluator::NodeEvaluator;

/// Raises an alarm for the walk's asset through the configured sink.
pub struct CreateAlarmEvaluator {
    alarms: Arc<dyn AlarmSink>,
}

impl CreateAlarmEvaluator {
    pub fn new(alarms: Arc<dyn AlarmSink>) -> Self {
        Self { alarms }
    }
}

#[async_trait]
impl NodeEvaluator for CreateAlarmEvaluator {
    type Config = CreateAlarmConfig;

    async fn evaluate(
        &self,
        node_id: &str,
        config: &CreateAlarmConfig,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        self.alarms
            .raise(AlarmRequest {
                tenant_id: context.tenant_id.clone(),
                asset_id: context.asset_id.clone(),
                rule_id: context.rule_id.clone(),
                node_id: node_id.to_string(),
                alarm_code: config.alarm_code.clone(),
                name: config.name.clone(),
                message: config.message.clone(),
                severity: config.severity.clone(),
                raised_at: Utc::now(),
            })
            .await?;
        Ok(Value::Null)
    }
}
