//! Public entry points of the engine.
//!
//! [`RuleEngine`] ties the rule store, the dispatcher and the recorder
//! together. Every invocation it starts, successful or not, writes exactly one
//! execution record.
//!
//! ```rust
//! # async fn example() {
//! use std::sync::Arc;
//! use assetrules::engine::node::TriggerKind;
//! use assetrules::engine::service::RuleEngine;
//! use assetrules::storage::{InMemoryAssetRepository, InMemoryRuleStore};
//!
//! let engine = RuleEngine::builder(
//!     Arc::new(InMemoryRuleStore::new()),
//!     Arc::new(InMemoryAssetRepository::new()),
//! )
//! .build();
//!
//! let result = engine
//!     .run_rule("rule-1", "asset-1", "tenant-1", TriggerKind::Manual, serde_json::json!({}))
//!     .await;
//! assert!(!result.success);
//! # }
//! ```

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::alarm::{AlarmSink, TracingAlarmSink};
use crate::computed::{ComputedFieldEvaluator, ExpressionComputedFieldEvaluator};
use crate::config::Config;
use crate::constants::{
    DEFAULT_EXECUTION_TIMEOUT_MS, DEFAULT_MAX_CONCURRENT_EXECUTIONS,
    METRIC_RULE_DISPATCH_CANDIDATES,
};
use crate::consumer::RuleEvent;
use crate::engine::dispatcher::RuleDispatcher;
use crate::engine::node::{NodeKind, RuleNode, TriggerKind};
use crate::engine::recorder::{ExecutionRecorder, Invocation, RunResult};
use crate::errors::EngineError;
use crate::metrics::{NoOpMetricsPublisher, SharedMetricsPublisher};
use crate::storage::asset::AssetRepository;
use crate::storage::execution_log::{ExecutionLogStore, TracingExecutionLogStore};
use crate::storage::rule::{Rule, RuleStore};

/// Engine-wide execution limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Deadline for rules that do not set their own `timeoutMs`
    pub execution_timeout: Duration,
    /// Upper bound on walks running at once for one event
    pub max_concurrent_executions: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_millis(DEFAULT_EXECUTION_TIMEOUT_MS),
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            execution_timeout: *config.execution_timeout.as_ref(),
            max_concurrent_executions: *config.max_concurrent_executions.as_ref(),
        }
    }
}

/// Runs rules against assets. Cheap to clone; clones share collaborators.
#[derive(Clone)]
pub struct RuleEngine {
    rules: Arc<dyn RuleStore>,
    dispatcher: Arc<RuleDispatcher>,
    recorder: Arc<ExecutionRecorder>,
    metrics: SharedMetricsPublisher,
    settings: EngineSettings,
}

/// Assembles a [`RuleEngine`]. Collaborators that are not set fall back to
/// the tracing-backed log and alarm sinks, formula evaluation over the asset
/// repository, and no metrics.
pub struct RuleEngineBuilder {
    rules: Arc<dyn RuleStore>,
    assets: Arc<dyn AssetRepository>,
    execution_log: Option<Arc<dyn ExecutionLogStore>>,
    computed: Option<Arc<dyn ComputedFieldEvaluator>>,
    alarms: Option<Arc<dyn AlarmSink>>,
    metrics: Option<SharedMetricsPublisher>,
    settings: EngineSettings,
}

impl RuleEngineBuilder {
    pub fn execution_log(mut self, execution_log: Arc<dyn ExecutionLogStore>) -> Self {
        self.execution_log = Some(execution_log);
        self
    }

    pub fn computed_fields(mut self, computed: Arc<dyn ComputedFieldEvaluator>) -> Self {
        self.computed = Some(computed);
        self
    }

    pub fn alarms(mut self, alarms: Arc<dyn AlarmSink>) -> Self {
        self.alarms = Some(alarms);
        self
    }

    pub fn metrics(mut self, metrics: SharedMetricsPublisher) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> RuleEngine {
        let computed = self
            .computed
            .unwrap_or_else(|| Arc::new(ExpressionComputedFieldEvaluator::new(self.assets.clone())));
        let alarms = self
            .alarms
            .unwrap_or_else(|| Arc::new(TracingAlarmSink::new()));
        let execution_log = self
            .execution_log
            .unwrap_or_else(|| Arc::new(TracingExecutionLogStore::new()));
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoOpMetricsPublisher::new()));

        RuleEngine {
            rules: self.rules,
            dispatcher: Arc::new(RuleDispatcher::new(
                self.assets,
                computed,
                alarms,
                self.settings.execution_timeout,
            )),
            recorder: Arc::new(ExecutionRecorder::new(execution_log, metrics.clone())),
            metrics,
            settings: self.settings,
        }
    }
}

impl RuleEngine {
    pub fn builder(rules: Arc<dyn RuleStore>, assets: Arc<dyn AssetRepository>) -> RuleEngineBuilder {
        RuleEngineBuilder {
            rules,
            assets,
            execution_log: None,
            computed: None,
            alarms: None,
            metrics: None,
            settings: EngineSettings::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Loads an active rule and runs it. A missing or inactive rule is a
    /// failed, recorded invocation.
    pub async fn run_rule(
        &self,
        rule_id: &str,
        asset_id: &str,
        tenant_id: &str,
        trigger_kind: TriggerKind,
        trigger_payload: Value,
    ) -> RunResult {
        let invocation = Invocation {
            rule_id,
            tenant_id,
            asset_id,
            trigger_kind,
            trigger_payload: &trigger_payload,
        };

        let walk = async {
            let rule = self
                .rules
                .find_active_by_id(rule_id, tenant_id)
                .await?
                .ok_or_else(|| EngineError::RuleNotFound {
                    rule_id: rule_id.to_string(),
                })?;
            self.dispatcher
                .run(&rule, asset_id, tenant_id, trigger_kind, trigger_payload.clone())
                .await
        };

        self.recorder.record(invocation, walk).await
    }

    /// Runs an already loaded rule.
    pub async fn execute(
        &self,
        rule: &Rule,
        asset_id: &str,
        tenant_id: &str,
        trigger_kind: TriggerKind,
        trigger_payload: Value,
    ) -> RunResult {
        let invocation = Invocation {
            rule_id: &rule.id,
            tenant_id,
            asset_id,
            trigger_kind,
            trigger_payload: &trigger_payload,
        };
        let walk = self.dispatcher.run(
            rule,
            asset_id,
            tenant_id,
            trigger_kind,
            trigger_payload.clone(),
        );

        self.recorder.record(invocation, walk).await
    }

    /// Active rules of the tenant that apply to the asset type, highest
    /// priority first. Rules of equal priority keep store order.
    pub async fn find_applicable_rules(
        &self,
        tenant_id: &str,
        asset_type_id: &str,
    ) -> Result<Vec<Rule>, EngineError> {
        let mut rules: Vec<Rule> = self
            .rules
            .find_active_by_tenant(tenant_id)
            .await?
            .into_iter()
            .filter(|rule| rule.is_active() && rule.applies_to_asset_type(asset_type_id))
            .collect();

        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    /// Runs every applicable rule with a trigger matching the event.
    ///
    /// Walks run concurrently, at most `max_concurrent_executions` at a time,
    /// and are started in priority order. Results come back in the same order.
    pub async fn dispatch_event(
        &self,
        event: &RuleEvent,
    ) -> Result<Vec<(String, RunResult)>, EngineError> {
        let asset = event.asset();
        let kind = event.trigger_kind();
        let key = event.trigger_key();

        let candidates: Vec<Rule> = self
            .find_applicable_rules(&asset.tenant_id, &asset.asset_type_id)
            .await?
            .into_iter()
            .filter(|rule| event.rule_id().is_none_or(|id| id == rule.id))
            .filter(|rule| has_matching_trigger(rule, kind, key))
            .collect();

        debug!(
            tenant.id = %asset.tenant_id,
            asset.id = %asset.asset_id,
            trigger = %kind,
            candidates = candidates.len(),
            "Dispatching event"
        );
        self.metrics
            .gauge(METRIC_RULE_DISPATCH_CANDIDATES, candidates.len() as u64)
            .await;

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_executions.max(1)));
        let payload = event.trigger_payload();
        let mut tasks = JoinSet::new();

        for (index, rule) in candidates.into_iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                EngineError::PermitUnavailable {
                    details: e.to_string(),
                }
            })?;

            let engine = self.clone();
            let asset_id = asset.asset_id.clone();
            let tenant_id = asset.tenant_id.clone();
            let payload = payload.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let result = engine
                    .execute(&rule, &asset_id, &tenant_id, kind, payload)
                    .await;
                (index, rule.id, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = ?e, "Rule execution task failed"),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        Ok(results
            .into_iter()
            .map(|(_, rule_id, result)| (rule_id, result))
            .collect())
    }
}

/// True when any trigger node of the rule accepts an event of `kind` for `key`.
/// Trigger nodes with invalid configuration never match.
fn has_matching_trigger(rule: &Rule, kind: TriggerKind, key: Option<&str>) -> bool {
    rule.nodes
        .iter()
        .filter(|definition| TriggerKind::from_node_type(&definition.node_type).is_some())
        .filter_map(|definition| RuleNode::compile(definition).ok())
        .any(|node| matches!(node.kind, NodeKind::Trigger(ref trigger) if trigger.matches(kind, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::InMemoryAlarmSink;
    use crate::storage::asset::InMemoryAssetRepository;
    use crate::storage::execution_log::InMemoryExecutionLogStore;
    use crate::storage::rule::InMemoryRuleStore;
    use crate::test_helpers::{ReadOnlyAssetRepository, edge, rule_from_json, test_asset};
    use serde_json::json;

    struct Harness {
        engine: RuleEngine,
        rules: Arc<InMemoryRuleStore>,
        log: Arc<InMemoryExecutionLogStore>,
        alarms: Arc<InMemoryAlarmSink>,
    }

    fn harness_with(assets: Arc<dyn AssetRepository>) -> Harness {
        let rules = Arc::new(InMemoryRuleStore::new());
        let log = Arc::new(InMemoryExecutionLogStore::new());
        let alarms = Arc::new(InMemoryAlarmSink::new());
        let engine = RuleEngine::builder(rules.clone(), assets)
            .execution_log(log.clone())
            .alarms(alarms.clone())
            .build();
        Harness {
            engine,
            rules,
            log,
            alarms,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(InMemoryAssetRepository::with_assets(vec![test_asset()])))
    }

    fn alarm_rule(id: &str, priority: u32, trigger: Value) -> Rule {
        let mut rule = rule_from_json(
            json!([
                trigger,
                {"id": "alarm", "type": "create_alarm", "config": {"alarmCode": id, "name": id}}
            ]),
            json!([edge("t", "alarm")]),
        );
        rule.id = id.to_string();
        rule.priority = priority;
        rule
    }

    fn telemetry_event(key: &str) -> RuleEvent {
        RuleEvent::parse(
            &json!({
                "type": "telemetry_change",
                "tenantId": "t1",
                "assetId": "a1",
                "assetTypeId": "well",
                "telemetryKey": key,
                "value": 610
            })
            .to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_rule_not_found_is_recorded() {
        let h = harness();
        let result = h
            .engine
            .run_rule("nope", "a1", "t1", TriggerKind::Manual, json!({}))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Rule not found"));
        assert_eq!(h.log.len(), 1);
        assert_eq!(h.log.records()[0].rule_id, "nope");
    }

    #[tokio::test]
    async fn test_run_rule_executes_stored_rule() {
        let h = harness();
        h.rules.upsert(alarm_rule("r1", 0, json!({"id": "t", "type": "manual", "config": {}})));

        let result = h
            .engine
            .run_rule("r1", "a1", "t1", TriggerKind::Manual, json!({"by": "operator"}))
            .await;

        assert!(result.success, "{:?}", result.error);
        let outputs = &result.result.unwrap()["outputs"];
        assert_eq!(outputs["t"], json!({"by": "operator"}));
        assert_eq!(outputs["alarm"], Value::Null);
        assert_eq!(h.alarms.len(), 1);
        assert_eq!(h.log.len(), 1);
    }

    #[tokio::test]
    async fn test_applicable_rules_sorted_by_priority() {
        let h = harness();
        let manual = json!({"id": "t", "type": "manual", "config": {}});
        h.rules.upsert(alarm_rule("low", 1, manual.clone()));
        h.rules.upsert(alarm_rule("high-a", 5, manual.clone()));
        h.rules.upsert(alarm_rule("high-b", 5, manual.clone()));
        let mut pump = alarm_rule("pump", 9, manual);
        pump.applies_to_asset_types = vec!["pump".to_string()];
        h.rules.upsert(pump);

        let ids: Vec<String> = h
            .engine
            .find_applicable_rules("t1", "well")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["high-a", "high-b", "low"]);
    }

    #[tokio::test]
    async fn test_dispatch_matches_trigger_kind_and_key() {
        let h = harness();
        h.rules.upsert(alarm_rule(
            "pressure",
            0,
            json!({"id": "t", "type": "telemetry_change", "config": {"telemetryKey": "pressure"}}),
        ));
        h.rules.upsert(alarm_rule(
            "any-telemetry",
            1,
            json!({"id": "t", "type": "telemetry_change", "config": {}}),
        ));
        h.rules.upsert(alarm_rule(
            "flow",
            2,
            json!({"id": "t", "type": "telemetry_change", "config": {"telemetryKey": "flow"}}),
        ));
        h.rules.upsert(alarm_rule(
            "status",
            3,
            json!({"id": "t", "type": "status_change", "config": {}}),
        ));

        let results = h.engine.dispatch_event(&telemetry_event("pressure")).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["any-telemetry", "pressure"]);
        assert!(results.iter().all(|(_, r)| r.success));
        assert_eq!(h.log.len(), 2);
        assert_eq!(h.alarms.len(), 2);
    }

    #[tokio::test]
    async fn test_manual_event_with_rule_id_runs_one_rule() {
        let h = harness();
        let manual = json!({"id": "t", "type": "manual", "config": {}});
        h.rules.upsert(alarm_rule("m1", 0, manual.clone()));
        h.rules.upsert(alarm_rule("m2", 0, manual));

        let event = RuleEvent::parse(
            r#"{"type":"manual","tenantId":"t1","assetId":"a1","assetTypeId":"well","ruleId":"m2"}"#,
        )
        .unwrap();
        let results = h.engine.dispatch_event(&event).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "m2");
    }

    #[tokio::test]
    async fn test_collaborator_error_fails_walk_with_message() {
        let assets = Arc::new(InMemoryAssetRepository::with_assets(vec![test_asset()]));
        let h = harness_with(Arc::new(ReadOnlyAssetRepository::new(assets)));
        let mut rule = rule_from_json(
            json!([
                {"id": "t", "type": "manual", "config": {}},
                {"id": "s", "type": "set_status", "config": {"status": "DOWN"}}
            ]),
            json!([edge("t", "s")]),
        );
        rule.id = "writer".to_string();
        h.rules.upsert(rule);

        let result = h
            .engine
            .run_rule("writer", "a1", "t1", TriggerKind::Manual, json!({}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("error-assetrules-storage-2"));
        assert!(!h.log.records()[0].success);
    }

    #[test]
    fn test_settings_default() {
        let settings = EngineSettings::default();
        assert_eq!(settings.execution_timeout, Duration::from_millis(5000));
        assert_eq!(settings.max_concurrent_executions, 8);
    }
}
