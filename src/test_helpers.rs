//! Shared fixtures for unit tests.
//!
//! Assets, rules and contexts used across the engine tests, plus repository
//! wrappers that slow down or fail collaborator calls.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::common::number_value;
use crate::engine::context::ExecutionContext;
use crate::engine::node::TriggerKind;
use crate::errors::StorageError;
use crate::storage::StorageResult;
use crate::storage::asset::{AssetRepository, AssetSnapshot, AssetUpdate};
use crate::storage::rule::Rule;

// Tests that touch process environment variables hold this lock
pub static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Well `a1` of tenant `t1`, pressure 600, in zone `north` at depth 1500.
pub fn test_asset() -> AssetSnapshot {
    asset_with_pressure(600.0)
}

/// Integral pressures are stored as JSON integers.
pub fn asset_with_pressure(pressure: f64) -> AssetSnapshot {
    let pressure = number_value(pressure).expect("finite pressure");
    serde_json::from_value(json!({
        "id": "a1",
        "tenantId": "t1",
        "assetTypeId": "well",
        "name": "Well A1",
        "status": "OPERATIONAL",
        "telemetry": {
            "pressure": {"value": pressure, "timestamp": "2026-01-01T00:00:00Z"}
        },
        "attributes": {"zone": "north", "depth": 1500},
        "computedValues": {}
    }))
    .expect("valid asset fixture")
}

/// A context for a pressure telemetry change on `asset`.
pub fn test_context(asset: AssetSnapshot) -> ExecutionContext {
    let value = asset
        .telemetry_value("pressure")
        .cloned()
        .unwrap_or(Value::Null);
    ExecutionContext::new(
        "r1",
        asset,
        TriggerKind::TelemetryChange,
        json!({
            "telemetryKey": "pressure",
            "value": value,
            "timestamp": "2026-01-01T00:00:00Z"
        }),
    )
}

/// Active rule `r1` of tenant `t1` for wells, with the given nodes and edges.
pub fn rule_from_json(nodes: Value, connections: Value) -> Rule {
    serde_json::from_value(json!({
        "id": "r1",
        "tenantId": "t1",
        "name": "test rule",
        "status": "ACTIVE",
        "appliesToAssetTypes": ["well"],
        "nodes": nodes,
        "connections": connections
    }))
    .expect("valid rule fixture")
}

pub fn edge(from: &str, to: &str) -> Value {
    json!({
        "id": format!("{from}->{to}"),
        "fromNode": from,
        "fromPort": "out",
        "toNode": to,
        "toPort": "in"
    })
}

/// Delays every read by a fixed duration before delegating.
pub struct SlowAssetRepository {
    inner: Arc<dyn AssetRepository>,
    delay: Duration,
}

impl SlowAssetRepository {
    pub fn new(inner: Arc<dyn AssetRepository>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl AssetRepository for SlowAssetRepository {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        asset_id: &str,
    ) -> StorageResult<Option<AssetSnapshot>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_id(tenant_id, asset_id).await
    }

    async fn update(
        &self,
        tenant_id: &str,
        asset_id: &str,
        update: AssetUpdate,
    ) -> StorageResult<()> {
        self.inner.update(tenant_id, asset_id, update).await
    }

    async fn update_computed_values(
        &self,
        tenant_id: &str,
        asset_id: &str,
        computed: Map<String, Value>,
    ) -> StorageResult<()> {
        self.inner
            .update_computed_values(tenant_id, asset_id, computed)
            .await
    }
}

/// Reads succeed from the wrapped repository; every write is rejected.
pub struct ReadOnlyAssetRepository {
    inner: Arc<dyn AssetRepository>,
}

impl ReadOnlyAssetRepository {
    pub fn new(inner: Arc<dyn AssetRepository>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AssetRepository for ReadOnlyAssetRepository {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        asset_id: &str,
    ) -> StorageResult<Option<AssetSnapshot>> {
        self.inner.find_by_id(tenant_id, asset_id).await
    }

    async fn update(
        &self,
        _tenant_id: &str,
        _asset_id: &str,
        _update: AssetUpdate,
    ) -> StorageResult<()> {
        Err(StorageError::WriteRejected {
            details: "repository is read-only".to_string(),
        })
    }

    async fn update_computed_values(
        &self,
        _tenant_id: &str,
        _asset_id: &str,
        _computed: Map<String, Value>,
    ) -> StorageResult<()> {
        Err(StorageError::WriteRejected {
            details: "repository is read-only".to_string(),
        })
    }
}
