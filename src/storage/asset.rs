use super::StorageResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, instrument};

/// Point-in-time view of an asset, read once at the start of a walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSnapshot {
    pub id: String,

    pub tenant_id: String,

    pub asset_type_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: String,

    /// Latest telemetry by key. Entries are either raw values or objects of the
    /// form `{"value": ..., "timestamp": ...}`.
    #[serde(default, alias = "currentTelemetry")]
    pub telemetry: Map<String, Value>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub computed_values: Map<String, Value>,
}

impl AssetSnapshot {
    /// Current value of a telemetry key, unwrapping `{"value": ...}` entries.
    pub fn telemetry_value(&self, key: &str) -> Option<&Value> {
        self.telemetry.get(key).map(|entry| match entry {
            Value::Object(fields) => fields.get("value").unwrap_or(entry),
            other => other,
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Partial update applied through [`AssetRepository::update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AssetUpdate {
    pub fn attributes(attributes: Map<String, Value>) -> Self {
        Self {
            attributes: Some(attributes),
            status: None,
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            attributes: None,
            status: Some(status.into()),
        }
    }
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn find_by_id(&self, tenant_id: &str, asset_id: &str)
    -> StorageResult<Option<AssetSnapshot>>;

    async fn update(&self, tenant_id: &str, asset_id: &str, update: AssetUpdate)
    -> StorageResult<()>;

    /// Replace the asset's computed-value map.
    async fn update_computed_values(
        &self,
        tenant_id: &str,
        asset_id: &str,
        computed: Map<String, Value>,
    ) -> StorageResult<()>;
}

#[async_trait]
impl<T: AssetRepository + ?Sized> AssetRepository for Arc<T> {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        asset_id: &str,
    ) -> StorageResult<Option<AssetSnapshot>> {
        self.as_ref().find_by_id(tenant_id, asset_id).await
    }

    async fn update(
        &self,
        tenant_id: &str,
        asset_id: &str,
        update: AssetUpdate,
    ) -> StorageResult<()> {
        self.as_ref().update(tenant_id, asset_id, update).await
    }

    async fn update_computed_values(
        &self,
        tenant_id: &str,
        asset_id: &str,
        computed: Map<String, Value>,
    ) -> StorageResult<()> {
        self.as_ref()
            .update_computed_values(tenant_id, asset_id, computed)
            .await
    }
}

/// Asset repository kept in memory, keyed by tenant and asset id.
///
/// Counts every write so callers can assert that a walk did (or did not)
/// touch the repository.
#[derive(Default)]
pub struct InMemoryAssetRepository {
    assets: RwLock<HashMap<(String, String), AssetSnapshot>>,
    writes: AtomicUsize,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: Vec<AssetSnapshot>) -> Self {
        let repository = Self::new();
        for asset in assets {
            repository.insert(asset);
        }
        repository
    }

    pub fn insert(&self, asset: AssetSnapshot) {
        self.assets
            .write()
            .insert((asset.tenant_id.clone(), asset.id.clone()), asset);
    }

    /// Current stored state, bypassing the trait.
    pub fn get(&self, tenant_id: &str, asset_id: &str) -> Option<AssetSnapshot> {
        self.assets
            .read()
            .get(&(tenant_id.to_string(), asset_id.to_string()))
            .cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn modify<F>(&self, tenant_id: &str, asset_id: &str, f: F) -> StorageResult<()>
    where
        F: FnOnce(&mut AssetSnapshot),
    {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut assets = self.assets.write();
        let asset = assets
            .get_mut(&(tenant_id.to_string(), asset_id.to_string()))
            .ok_or_else(|| crate::errors::StorageError::WriteRejected {
                details: format!("asset {asset_id} does not exist for tenant {tenant_id}"),
            })?;
        f(asset);
        Ok(())
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    #[instrument(skip(self), fields(store.operation = "find_asset"))]
    async fn find_by_id(
        &self,
        tenant_id: &str,
        asset_id: &str,
    ) -> StorageResult<Option<AssetSnapshot>> {
        Ok(self.get(tenant_id, asset_id))
    }

    #[instrument(skip(self, update), fields(store.operation = "update_asset"))]
    async fn update(
        &self,
        tenant_id: &str,
        asset_id: &str,
        update: AssetUpdate,
    ) -> StorageResult<()> {
        self.modify(tenant_id, asset_id, |asset| {
            if let Some(attributes) = update.attributes {
                asset.attributes = attributes;
            }
            if let Some(status) = update.status {
                asset.status = status;
            }
        })?;
        debug!("Asset updated");
        Ok(())
    }

    #[instrument(skip(self, computed), fields(store.operation = "update_computed_values"))]
    async fn update_computed_values(
        &self,
        tenant_id: &str,
        asset_id: &str,
        computed: Map<String, Value>,
    ) -> StorageResult<()> {
        self.modify(tenant_id, asset_id, |asset| asset.computed_values = computed)?;
        debug!("Asset computed values updated");
        Ok(())
    }
}
