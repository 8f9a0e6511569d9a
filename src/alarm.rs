//! Alarm raising for `create_alarm` actions.

use crate::storage::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An alarm raised by a rule for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub rule_id: String,
    pub node_id: String,
    pub alarm_code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub severity: String,
    pub raised_at: DateTime<Utc>,
}

#[async_trait]
pub trait AlarmSink: Send + Sync {
    async fn raise(&self, alarm: AlarmRequest) -> StorageResult<()>;
}

#[async_trait]
impl<T: AlarmSink + ?Sized> AlarmSink for Arc<T> {
    async fn raise(&self, alarm: AlarmRequest) -> StorageResult<()> {
        self.as_ref().raise(alarm).await
    }
}

/// Logs every alarm and stores nothing.
#[derive(Debug, Default)]
pub struct TracingAlarmSink;

impl TracingAlarmSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlarmSink for TracingAlarmSink {
    async fn raise(&self, alarm: AlarmRequest) -> StorageResult<()> {
        tracing::info!(
            tenant.id = %alarm.tenant_id,
            asset.id = %alarm.asset_id,
            rule.id = %alarm.rule_id,
            node.id = %alarm.node_id,
            alarm.code = %alarm.alarm_code,
            alarm.name = %alarm.name,
            alarm.message = alarm.message.as_deref().unwrap_or_default(),
            alarm.severity = %alarm.severity,
            "Alarm created by rule"
        );
        Ok(())
    }
}

/// Keeps raised alarms in memory, in the order they were raised.
#[derive(Debug, Default)]
pub struct InMemoryAlarmSink {
    alarms: Mutex<Vec<AlarmRequest>>,
}

impl InMemoryAlarmSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarms(&self) -> Vec<AlarmRequest> {
        self.alarms.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.alarms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.lock().is_empty()
    }
}

#[async_trait]
impl AlarmSink for InMemoryAlarmSink {
    async fn raise(&self, alarm: AlarmRequest) -> StorageResult<()> {
        self.alarms.lock().push(alarm);
        Ok(())
    }
}
