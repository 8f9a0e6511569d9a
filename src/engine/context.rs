//! State shared by every node visit of one walk.
//!
//! Holds the asset snapshot read at walk start, the trigger payload, node
//! outputs in first-visit order and the attribute and computed-value maps
//! staged by earlier writes in the same walk.

use crate::engine::node::TriggerKind;
use crate::storage::asset::AssetSnapshot;
use ordermap::OrderMap;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

/// Per-walk scratch state.
///
/// Created fresh for every walk and owned by the dispatcher. Handlers only see
/// a shared reference; node outputs are written by the dispatcher after each
/// handler returns, in visit order.
#[derive(Debug)]
pub struct ExecutionContext {
    pub rule_id: String,
    pub asset_id: String,
    pub tenant_id: String,
    pub trigger_kind: TriggerKind,
    pub trigger_payload: Value,
    /// Read once at walk start and never refreshed
    pub asset: AssetSnapshot,
    outputs: OrderMap<String, Value>,
    scope: Value,
    staged: Mutex<StagedWrites>,
}

/// Asset writes made by actions earlier in the same walk.
#[derive(Debug, Default)]
struct StagedWrites {
    attributes: Map<String, Value>,
    computed: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(
        rule_id: &str,
        asset: AssetSnapshot,
        trigger_kind: TriggerKind,
        trigger_payload: Value,
    ) -> Self {
        let scope = build_scope(&asset);
        Self {
            rule_id: rule_id.to_string(),
            asset_id: asset.id.clone(),
            tenant_id: asset.tenant_id.clone(),
            trigger_kind,
            trigger_payload,
            asset,
            outputs: OrderMap::new(),
            scope,
            staged: Mutex::new(StagedWrites::default()),
        }
    }

    /// Output of a node visited earlier in this walk.
    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id)
    }

    pub fn outputs(&self) -> &OrderMap<String, Value> {
        &self.outputs
    }

    /// Stores a node's output. A node visited twice keeps its first position
    /// and its latest value.
    pub(crate) fn record_output(&mut self, node_id: &str, output: Value) {
        self.outputs.insert(node_id.to_string(), output);
    }

    pub fn into_outputs(self) -> OrderMap<String, Value> {
        self.outputs
    }

    /// Read-only scope for expressions: `{telemetry, attributes, computed, asset}`.
    pub fn scope(&self) -> &Value {
        &self.scope
    }

    /// Records an attribute write and returns the full attribute map to
    /// persist: the snapshot's attributes plus every write staged so far.
    ///
    /// The snapshot itself is untouched, so reads later in the walk still see
    /// the values loaded at walk start.
    pub(crate) fn stage_attribute(&self, key: &str, value: Value) -> Map<String, Value> {
        let mut staged = self.staged.lock();
        staged.attributes.insert(key.to_string(), value);
        merged(&self.asset.attributes, &staged.attributes)
    }

    /// Same as [`Self::stage_attribute`] for the computed-value map.
    pub(crate) fn stage_computed(&self, key: &str, entry: Value) -> Map<String, Value> {
        let mut staged = self.staged.lock();
        staged.computed.insert(key.to_string(), entry);
        merged(&self.asset.computed_values, &staged.computed)
    }
}

fn merged(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, value) in overlay {
        result.insert(key.clone(), value.clone());
    }
    result
}

/// Telemetry entries are exposed by value, so `telemetry.pressure` reads the
/// number whether the snapshot stores `612.5` or `{"value": 612.5, ...}`.
pub(crate) fn build_scope(asset: &AssetSnapshot) -> Value {
    let telemetry: Map<String, Value> = asset
        .telemetry
        .keys()
        .map(|key| {
            (
                key.clone(),
                asset.telemetry_value(key).cloned().unwrap_or(Value::Null),
            )
        })
        .collect();

    json!({
        "telemetry": telemetry,
        "attributes": asset.attributes,
        "computed": asset.computed_values,
        "asset": serde_json::to_value(asset).unwrap_or_default(),
    })
}
