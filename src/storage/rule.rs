use super::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Lifecycle status of a rule. Only `Active` rules are ever executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Disabled,
    Error,
}

/// A named automation program scoped to one tenant.
///
/// Rules are authored elsewhere and are read-only to the engine. The node and
/// edge sets are kept in their stored shape; they are compiled into a typed
/// [`crate::engine::graph::RuleGraph`] at the start of every walk.
///
/// # Examples
///
/// ```rust
/// use assetrules::storage::rule::Rule;
///
/// let rule: Rule = serde_json::from_value(serde_json::json!({
///     "id": "rule-1",
///     "tenantId": "tenant-1",
///     "name": "High pressure",
///     "status": "ACTIVE",
///     "appliesToAssetTypes": ["well"],
///     "nodes": [
///         {"id": "t", "type": "telemetry_change", "config": {}},
///         {"id": "l", "type": "log", "config": {"message": "pressure changed"}}
///     ],
///     "connections": [
///         {"id": "e1", "fromNode": "t", "fromPort": "out", "toNode": "l", "toPort": "in"}
///     ]
/// })).unwrap();
///
/// assert!(rule.is_active());
/// assert!(rule.applies_to_asset_type("well"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,

    pub tenant_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: RuleStatus,

    /// Higher priority rules are started first when an event fans out.
    #[serde(default)]
    pub priority: u32,

    /// Asset types this rule may run against.
    #[serde(default)]
    pub applies_to_asset_types: Vec<String>,

    /// Optional narrowing to specific assets. `None` and an empty list both mean
    /// "every asset of an applicable type".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to_assets: Option<Vec<String>>,

    #[serde(default)]
    pub nodes: Vec<RuleNodeDefinition>,

    /// Directed edges between nodes, in traversal order.
    #[serde(default, alias = "edges")]
    pub connections: Vec<RuleEdge>,

    #[serde(default)]
    pub config: RuleSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    pub fn applies_to_asset_type(&self, asset_type_id: &str) -> bool {
        self.applies_to_asset_types
            .iter()
            .any(|candidate| candidate == asset_type_id)
    }

    /// Returns false only when a non-empty specific-asset list excludes the asset.
    pub fn applies_to_asset(&self, asset_id: &str) -> bool {
        match &self.applies_to_assets {
            Some(assets) if !assets.is_empty() => assets.iter().any(|a| a == asset_id),
            _ => true,
        }
    }
}

/// Per-rule execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSettings {
    /// Deadline for one walk. Falls back to the engine default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// When set, a condition node that evaluates to `false` stops the walk from
    /// descending into that node's successors.
    #[serde(default)]
    pub branch_on_false: bool,
}

/// A node exactly as stored with the rule.
///
/// `node_type` is free text at this level; it becomes a typed
/// [`crate::engine::node::NodeKind`] when the rule is compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleNodeDefinition {
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub position: NodePosition,

    #[serde(default)]
    pub config: Map<String, Value>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Layout hint for the authoring UI. Not used during execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// A directed connection from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEdge {
    #[serde(default)]
    pub id: String,
    pub from_node: String,
    #[serde(default)]
    pub from_port: String,
    pub to_node: String,
    #[serde(default)]
    pub to_port: String,
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch one rule if it exists, belongs to the tenant and is `ACTIVE`.
    async fn find_active_by_id(&self, rule_id: &str, tenant_id: &str)
    -> StorageResult<Option<Rule>>;

    /// All `ACTIVE` rules of a tenant, in store order.
    async fn find_active_by_tenant(&self, tenant_id: &str) -> StorageResult<Vec<Rule>>;
}

#[async_trait]
impl<T: RuleStore + ?Sized> RuleStore for Arc<T> {
    async fn find_active_by_id(
        &self,
        rule_id: &str,
        tenant_id: &str,
    ) -> StorageResult<Option<Rule>> {
        self.as_ref().find_active_by_id(rule_id, tenant_id).await
    }

    async fn find_active_by_tenant(&self, tenant_id: &str) -> StorageResult<Vec<Rule>> {
        self.as_ref().find_active_by_tenant(tenant_id).await
    }
}

/// Rule store backed by a vector in memory. Used by the binary (rules loaded
/// from a JSON file) and by tests.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Insert a rule, replacing any rule with the same id and tenant.
    pub fn upsert(&self, rule: Rule) {
        let mut rules = self.rules.write();
        match rules
            .iter_mut()
            .find(|r| r.id == rule.id && r.tenant_id == rule.tenant_id)
        {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    #[instrument(skip(self), fields(store.operation = "find_active_by_id"))]
    async fn find_active_by_id(
        &self,
        rule_id: &str,
        tenant_id: &str,
    ) -> StorageResult<Option<Rule>> {
        let found = self
            .rules
            .read()
            .iter()
            .find(|r| r.id == rule_id && r.tenant_id == tenant_id && r.is_active())
            .cloned();

        if found.is_none() {
            debug!("Active rule not found");
        }

        Ok(found)
    }

    #[instrument(skip(self), fields(store.operation = "find_active_by_tenant"))]
    async fn find_active_by_tenant(&self, tenant_id: &str) -> StorageResult<Vec<Rule>> {
        let rules: Vec<Rule> = self
            .rules
            .read()
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.is_active())
            .cloned()
            .collect();

        debug!(rule.count = rules.len(), "Listed active rules for tenant");

        Ok(rules)
    }
}
