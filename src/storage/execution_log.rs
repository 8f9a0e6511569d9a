//! Rule execution audit records and the stores that persist them

use super::StorageResult;
use crate::errors::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

/// One node output, as listed in [`ExecutionRecord::actions_executed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecuted {
    pub node_id: String,
    pub output: Value,
}

/// The audit trail of one rule invocation. Exactly one is written per walk,
/// whether the walk succeeds, is skipped, or fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Globally unique identifier for the execution
    pub id: String,
    pub rule_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub trigger_type: String,
    pub trigger_data: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// `{"executed": true, "outputs": {...}}` or `{"skipped": true, "reason": ...}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub actions_executed: Vec<ActionExecuted>,
}

impl ExecutionRecord {
    /// A fresh record with a new ULID and no outcome yet.
    pub fn begin(
        rule_id: &str,
        tenant_id: &str,
        asset_id: &str,
        trigger_type: &str,
        trigger_data: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            rule_id: rule_id.to_string(),
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            trigger_type: trigger_type.to_string(),
            trigger_data,
            started_at,
            completed_at: started_at,
            duration_ms: 0,
            success: false,
            result: None,
            error: None,
            actions_executed: Vec::new(),
        }
    }
}

/// Aggregate view over a rule's execution history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub average_duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let mut stats = Self::default();
        let mut total_duration: u64 = 0;

        for record in records {
            stats.total += 1;
            if record.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            total_duration += record.duration_ms;
            if stats
                .last_executed_at
                .is_none_or(|last| record.completed_at > last)
            {
                stats.last_executed_at = Some(record.completed_at);
            }
        }

        if stats.total > 0 {
            stats.average_duration_ms = total_duration as f64 / stats.total as f64;
        }

        stats
    }
}

/// Trait for persisting rule execution records
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    /// Persist one record.
    async fn insert(&self, record: ExecutionRecord) -> StorageResult<()>;

    /// Most recent records for a rule, newest first.
    async fn list_by_rule(
        &self,
        _tenant_id: &str,
        _rule_id: &str,
        _limit: usize,
    ) -> StorageResult<Vec<ExecutionRecord>> {
        Ok(Vec::new())
    }

    async fn stats(&self, tenant_id: &str, rule_id: &str) -> StorageResult<ExecutionStats> {
        let records = self.list_by_rule(tenant_id, rule_id, usize::MAX).await?;
        Ok(ExecutionStats::from_records(&records))
    }
}

#[async_trait]
impl<T: ExecutionLogStore + ?Sized> ExecutionLogStore for Arc<T> {
    async fn insert(&self, record: ExecutionRecord) -> StorageResult<()> {
        self.as_ref().insert(record).await
    }

    async fn list_by_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<ExecutionRecord>> {
        self.as_ref().list_by_rule(tenant_id, rule_id, limit).await
    }

    async fn stats(&self, tenant_id: &str, rule_id: &str) -> StorageResult<ExecutionStats> {
        self.as_ref().stats(tenant_id, rule_id).await
    }
}

/// Discards every record.
#[derive(Default)]
pub struct NoopExecutionLogStore;

impl NoopExecutionLogStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionLogStore for NoopExecutionLogStore {
    async fn insert(&self, _record: ExecutionRecord) -> StorageResult<()> {
        Ok(())
    }
}

/// Tracing implementation that logs execution records
#[derive(Default)]
pub struct TracingExecutionLogStore;

impl TracingExecutionLogStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionLogStore for TracingExecutionLogStore {
    async fn insert(&self, record: ExecutionRecord) -> StorageResult<()> {
        if record.success {
            tracing::info!(
                execution.id = %record.id,
                rule.id = %record.rule_id,
                tenant.id = %record.tenant_id,
                asset.id = %record.asset_id,
                execution.trigger = %record.trigger_type,
                execution.duration_ms = record.duration_ms,
                execution.started_at = %record.started_at.to_rfc3339(),
                execution.completed_at = %record.completed_at.to_rfc3339(),
                execution.actions = record.actions_executed.len(),
                execution.result = "success",
                "Rule execution completed successfully"
            );
        } else {
            tracing::info!(
                execution.id = %record.id,
                rule.id = %record.rule_id,
                tenant.id = %record.tenant_id,
                asset.id = %record.asset_id,
                execution.trigger = %record.trigger_type,
                execution.duration_ms = record.duration_ms,
                execution.started_at = %record.started_at.to_rfc3339(),
                execution.completed_at = %record.completed_at.to_rfc3339(),
                execution.result = "failure",
                execution.error = record.error.as_deref().unwrap_or_default(),
                "Rule execution failed"
            );
        }

        Ok(())
    }
}

/// Keeps every record in memory. Backs tests and short-lived runs of the binary.
#[derive(Default)]
pub struct InMemoryExecutionLogStore {
    records: RwLock<Vec<ExecutionRecord>>,
}

impl InMemoryExecutionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in insertion order.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ExecutionLogStore for InMemoryExecutionLogStore {
    async fn insert(&self, record: ExecutionRecord) -> StorageResult<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn list_by_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<ExecutionRecord>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id && r.rule_id == rule_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Filesystem-based implementation that stores each record as a JSON file at
/// `<base>/<tenant>/<rule>/<execution-id>.json`.
pub struct FilesystemExecutionLogStore {
    base_directory: PathBuf,
}

impl FilesystemExecutionLogStore {
    pub fn new<P: AsRef<Path>>(base_directory: P) -> Self {
        Self {
            base_directory: base_directory.as_ref().to_path_buf(),
        }
    }

    /// Identifiers become path components, so they must not be able to escape
    /// the base directory.
    fn path_component(value: &str) -> StorageResult<&str> {
        if value.is_empty()
            || value == "."
            || value == ".."
            || value.contains(['/', '\\'])
        {
            return Err(StorageError::InvalidInput {
                details: format!("Invalid path component: '{}'", value),
            });
        }
        Ok(value)
    }

    fn rule_directory(&self, tenant_id: &str, rule_id: &str) -> StorageResult<PathBuf> {
        Ok(self
            .base_directory
            .join(Self::path_component(tenant_id)?)
            .join(Self::path_component(rule_id)?))
    }

    fn record_path(&self, record: &ExecutionRecord) -> StorageResult<PathBuf> {
        Ok(self
            .rule_directory(&record.tenant_id, &record.rule_id)?
            .join(format!("{}.json", Self::path_component(&record.id)?)))
    }
}

#[async_trait]
impl ExecutionLogStore for FilesystemExecutionLogStore {
    async fn insert(&self, record: ExecutionRecord) -> StorageResult<()> {
        let file_path = self.record_path(&record)?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json_content = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&file_path, json_content).await?;

        tracing::debug!(
            execution.id = %record.id,
            rule.id = %record.rule_id,
            file.path = %file_path.display(),
            "Saved execution record to filesystem"
        );

        Ok(())
    }

    async fn list_by_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<ExecutionRecord>> {
        let dir_path = self.rule_directory(tenant_id, rule_id)?;
        if !tokio::fs::try_exists(&dir_path).await? {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            match tokio::fs::read_to_string(&path).await {
                Ok(json_content) => match serde_json::from_str::<ExecutionRecord>(&json_content) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(
                            file.path = %path.display(),
                            error = %e,
                            "Failed to deserialize execution record"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        file.path = %path.display(),
                        error = %e,
                        "Failed to read execution record file"
                    );
                }
            }
        }

        // ULIDs sort by creation time; use them to break completed_at ties
        records.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records.truncate(limit);

        Ok(records)
    }
}
