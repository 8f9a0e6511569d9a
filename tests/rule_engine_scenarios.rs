use assetrules::alarm::InMemoryAlarmSink;
use assetrules::consumer::RuleEvent;
use assetrules::engine::node::TriggerKind;
use assetrules::engine::{EngineSettings, RuleEngine};
use assetrules::storage::{
    AssetRepository, AssetSnapshot, AssetUpdate, InMemoryAssetRepository,
    InMemoryExecutionLogStore, InMemoryRuleStore, Rule, StorageResult,
};
use assetrules::validation::Validator;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Asset repository that stalls every read, for deadline tests.
struct StalledAssetRepository {
    inner: InMemoryAssetRepository,
    delay: Duration,
}

#[async_trait]
impl AssetRepository for StalledAssetRepository {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        asset_id: &str,
    ) -> StorageResult<Option<AssetSnapshot>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_id(tenant_id, asset_id).await
    }

    async fn update(&self, tenant_id: &str, asset_id: &str, update: AssetUpdate) -> StorageResult<()> {
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

struct Harness {
    engine: RuleEngine,
    assets: Arc<InMemoryAssetRepository>,
    log: Arc<InMemoryExecutionLogStore>,
    alarms: Arc<InMemoryAlarmSink>,
}

fn well(pressure: i64) -> AssetSnapshot {
    serde_json::from_value(json!({
        "id": "well-7",
        "tenantId": "acme",
        "assetTypeId": "well",
        "name": "Well 7",
        "status": "OPERATIONAL",
        "telemetry": {"pressure": {"value": pressure, "timestamp": "2026-03-01T10:00:00Z"}},
        "attributes": {"zone": "north", "depth": 1500}
    }))
    .unwrap()
}

fn rule(id: &str, nodes: Value, connections: Value) -> Rule {
    serde_json::from_value(json!({
        "id": id,
        "tenantId": "acme",
        "name": id,
        "status": "ACTIVE",
        "appliesToAssetTypes": ["well"],
        "nodes": nodes,
        "connections": connections,
    }))
    .unwrap()
}

fn edges(pairs: &[(&str, &str)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .enumerate()
            .map(|(i, (from, to))| {
                json!({"id": format!("e{}", i), "fromNode": from, "fromPort": "out", "toNode": to, "toPort": "in"})
            })
            .collect(),
    )
}

fn harness(rules: Vec<Rule>, asset: AssetSnapshot) -> Harness {
    let assets = Arc::new(InMemoryAssetRepository::with_assets(vec![asset]));
    let log = Arc::new(InMemoryExecutionLogStore::new());
    let alarms = Arc::new(InMemoryAlarmSink::new());
    let engine = RuleEngine::builder(
        Arc::new(InMemoryRuleStore::with_rules(rules)),
        assets.clone(),
    )
    .execution_log(log.clone())
    .alarms(alarms.clone())
    .build();

    Harness {
        engine,
        assets,
        log,
        alarms,
    }
}

fn telemetry_payload(pressure: i64) -> Value {
    json!({"telemetryKey": "pressure", "value": pressure, "timestamp": "2026-03-01T10:00:00Z"})
}

fn pressure_alarm_rule() -> Rule {
    rule(
        "high-pressure",
        json!([
            {"id": "trigger", "type": "telemetry_change", "config": {"telemetryKey": "pressure"}},
            {"id": "check", "type": "if", "config": {"expression": "telemetry.pressure > 500"}},
            {"id": "alarm", "type": "create_alarm", "config": {"alarmCode": "HP-1", "name": "High pressure", "severity": "HIGH"}}
        ]),
        edges(&[("trigger", "check"), ("check", "alarm")]),
    )
}

#[tokio::test]
async fn test_rule_without_trigger_fails_with_one_record() {
    let no_trigger = rule(
        "orphan",
        json!([{"id": "log", "type": "log", "config": {"message": "never"}}]),
        json!([]),
    );
    let h = harness(vec![no_trigger], well(600));

    let result = h
        .engine
        .run_rule("orphan", "well-7", "acme", TriggerKind::Manual, json!({}))
        .await;

    assert!(!result.success);
    assert!(
        result
            .error
            .as_deref()
            .unwrap()
            .starts_with("error-assetrules-engine-3")
    );
    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
}

#[tokio::test]
async fn test_type_mismatch_is_a_skip_without_writes() {
    let mut pump_rule = rule(
        "pump-only",
        json!([
            {"id": "t", "type": "manual", "config": {}},
            {"id": "s", "type": "set_status", "config": {"status": "MAINTENANCE"}}
        ]),
        edges(&[("t", "s")]),
    );
    pump_rule.applies_to_asset_types = vec!["pump".to_string()];
    let h = harness(vec![pump_rule.clone()], well(600));

    let result = h
        .engine
        .execute(&pump_rule, "well-7", "acme", TriggerKind::Manual, json!({}))
        .await;

    assert!(result.success);
    assert!(result.is_skipped());
    assert_eq!(result.result.unwrap()["reason"], json!("Asset type mismatch"));
    assert_eq!(h.assets.write_count(), 0);
    assert_eq!(h.log.len(), 1);
}

#[tokio::test]
async fn test_identical_inputs_give_identical_outputs() {
    let r = rule(
        "calc",
        json!([
            {"id": "t", "type": "telemetry_change", "config": {}},
            {"id": "p", "type": "get_telemetry", "config": {"telemetryKey": "pressure"}},
            {"id": "m", "type": "math", "config": {"operation": "multiply", "operands": [{"nodeId": "p"}, 2]}},
            {"id": "c", "type": "if", "config": {"expression": "attributes.zone == 'north'"}}
        ]),
        edges(&[("t", "p"), ("p", "m"), ("t", "c")]),
    );
    let h = harness(vec![r], well(600));

    let first = h
        .engine
        .run_rule("calc", "well-7", "acme", TriggerKind::TelemetryChange, telemetry_payload(600))
        .await;
    let second = h
        .engine
        .run_rule("calc", "well-7", "acme", TriggerKind::TelemetryChange, telemetry_payload(600))
        .await;

    assert!(first.success);
    assert_eq!(first.result, second.result);
    let outputs = &first.result.unwrap()["outputs"];
    assert_eq!(outputs["m"], json!(1200));
    assert_eq!(outputs["c"], json!(true));
}

#[tokio::test]
async fn test_math_operations() {
    let math_rule = |id: &str, operation: &str, operands: Value| {
        rule(
            id,
            json!([
                {"id": "t", "type": "manual", "config": {}},
                {"id": "m", "type": "math", "config": {"operation": operation, "operands": operands}}
            ]),
            edges(&[("t", "m")]),
        )
    };
    let h = harness(
        vec![
            math_rule("add", "add", json!([2, 3])),
            math_rule("divide", "divide", json!([10, 2])),
            math_rule("power", "power", json!([2, 3])),
        ],
        well(600),
    );

    let added = h.engine.run_rule("add", "well-7", "acme", TriggerKind::Manual, json!({})).await;
    assert_eq!(added.result.unwrap()["outputs"]["m"], json!(5));

    let divided = h
        .engine
        .run_rule("divide", "well-7", "acme", TriggerKind::Manual, json!({}))
        .await;
    assert_eq!(divided.result.unwrap()["outputs"]["m"], json!(5));

    let unknown = h.engine.run_rule("power", "well-7", "acme", TriggerKind::Manual, json!({})).await;
    assert!(!unknown.success);
    assert!(unknown.error.unwrap().starts_with("error-assetrules-engine-7"));
}

#[tokio::test]
async fn test_condition_follows_pressure_and_tolerates_bad_expressions() {
    let r = rule(
        "conditions",
        json!([
            {"id": "t", "type": "telemetry_change", "config": {}},
            {"id": "high", "type": "if", "config": {"expression": "telemetry.pressure > 500"}},
            {"id": "broken", "type": "if", "config": {"expression": "telemetry.pressure >"}},
            {"id": "after", "type": "log", "config": {"message": "still running"}}
        ]),
        edges(&[("t", "high"), ("t", "broken"), ("broken", "after")]),
    );

    let h = harness(vec![r.clone()], well(600));
    let result = h
        .engine
        .run_rule("conditions", "well-7", "acme", TriggerKind::TelemetryChange, telemetry_payload(600))
        .await;
    assert!(result.success);
    let outputs = result.result.unwrap()["outputs"].clone();
    assert_eq!(outputs["high"], json!(true));
    assert_eq!(outputs["broken"], json!(false));
    assert_eq!(outputs["after"], Value::Null);
    assert!(outputs.as_object().unwrap().contains_key("after"));

    let h = harness(vec![r], well(400));
    let result = h
        .engine
        .run_rule("conditions", "well-7", "acme", TriggerKind::TelemetryChange, telemetry_payload(400))
        .await;
    assert_eq!(result.result.unwrap()["outputs"]["high"], json!(false));
}

#[tokio::test]
async fn test_set_attribute_writes_upstream_output() {
    let r = rule(
        "copy-pressure",
        json!([
            {"id": "t", "type": "telemetry_change", "config": {}},
            {"id": "p", "type": "get_telemetry", "config": {"telemetryKey": "pressure"}},
            {"id": "s", "type": "set_attribute", "config": {"attribute": "lastPressure"}, "inputs": ["p"]}
        ]),
        edges(&[("t", "p"), ("p", "s")]),
    );
    let h = harness(vec![r], well(612));

    let result = h
        .engine
        .run_rule("copy-pressure", "well-7", "acme", TriggerKind::TelemetryChange, telemetry_payload(612))
        .await;

    assert!(result.success);
    let stored = h.assets.get("acme", "well-7").unwrap();
    assert_eq!(stored.attributes["lastPressure"], json!(612));
    assert_eq!(stored.attributes["zone"], json!("north"));
    assert_eq!(h.assets.write_count(), 1);
}

#[tokio::test]
async fn test_alarm_node_runs_regardless_of_condition() {
    for pressure in [600, 100] {
        let h = harness(vec![pressure_alarm_rule()], well(pressure));

        let result = h
            .engine
            .run_rule(
                "high-pressure",
                "well-7",
                "acme",
                TriggerKind::TelemetryChange,
                telemetry_payload(pressure),
            )
            .await;

        assert!(result.success, "pressure {}", pressure);
        let outputs = result.result.unwrap()["outputs"].clone();
        assert!(outputs.as_object().unwrap().contains_key("alarm"));
        assert_eq!(outputs["check"], json!(pressure > 500));
        assert_eq!(h.alarms.len(), 1);
        assert_eq!(h.alarms.alarms()[0].alarm_code, "HP-1");
    }
}

#[tokio::test]
async fn test_branch_on_false_suppresses_alarm() {
    let mut r = pressure_alarm_rule();
    r.config.branch_on_false = true;
    let h = harness(vec![r], well(100));

    let result = h
        .engine
        .run_rule("high-pressure", "well-7", "acme", TriggerKind::TelemetryChange, telemetry_payload(100))
        .await;

    assert!(result.success);
    let outputs = result.result.unwrap()["outputs"].clone();
    assert_eq!(outputs["check"], json!(false));
    assert!(!outputs.as_object().unwrap().contains_key("alarm"));
    assert!(h.alarms.is_empty());
}

#[tokio::test]
async fn test_cyclic_rule_fails() {
    let r = rule(
        "loop",
        json!([
            {"id": "t", "type": "manual", "config": {}},
            {"id": "a", "type": "log", "config": {}},
            {"id": "b", "type": "log", "config": {}}
        ]),
        edges(&[("t", "a"), ("a", "b"), ("b", "a")]),
    );
    let h = harness(vec![r], well(600));

    let result = h.engine.run_rule("loop", "well-7", "acme", TriggerKind::Manual, json!({})).await;

    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("error-assetrules-engine-12"));
    assert_eq!(h.log.len(), 1);
}

#[tokio::test]
async fn test_slow_walk_times_out() {
    let mut r = rule(
        "slow",
        json!([
            {"id": "t", "type": "manual", "config": {}},
            {"id": "l", "type": "log", "config": {}}
        ]),
        edges(&[("t", "l")]),
    );
    r.config.timeout_ms = Some(20);

    let log = Arc::new(InMemoryExecutionLogStore::new());
    let engine = RuleEngine::builder(
        Arc::new(InMemoryRuleStore::with_rules(vec![r])),
        Arc::new(StalledAssetRepository {
            inner: InMemoryAssetRepository::with_assets(vec![well(600)]),
            delay: Duration::from_millis(500),
        }),
    )
    .execution_log(log.clone())
    .build();

    let result = engine.run_rule("slow", "well-7", "acme", TriggerKind::Manual, json!({})).await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("error-assetrules-engine-13 Rule execution exceeded 20ms")
    );
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_events_fan_out_to_matching_triggers_only() {
    let pressure = pressure_alarm_rule();
    let mut temperature = rule(
        "temperature",
        json!([
            {"id": "t", "type": "telemetry_change", "config": {"telemetryKey": "temperature"}},
            {"id": "l", "type": "log", "config": {}}
        ]),
        edges(&[("t", "l")]),
    );
    temperature.priority = 10;
    let any_telemetry = rule(
        "any-telemetry",
        json!([
            {"id": "t", "type": "telemetry_change", "config": {}},
            {"id": "l", "type": "log", "config": {}}
        ]),
        edges(&[("t", "l")]),
    );
    let status = rule(
        "status",
        json!([
            {"id": "t", "type": "status_change", "config": {}},
            {"id": "l", "type": "log", "config": {}}
        ]),
        edges(&[("t", "l")]),
    );
    let h = harness(vec![pressure, temperature, any_telemetry, status], well(600));

    let event = RuleEvent::parse(
        r#"{"type":"telemetry_change","tenantId":"acme","assetId":"well-7","assetTypeId":"well",
            "telemetryKey":"pressure","value":600}"#,
    )
    .unwrap();
    let results = h.engine.dispatch_event(&event).await.unwrap();

    let ran: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ran, vec!["high-pressure", "any-telemetry"]);
    assert!(results.iter().all(|(_, r)| r.success));
    assert_eq!(h.log.len(), 2);
    assert_eq!(h.alarms.len(), 1);
}

#[tokio::test]
async fn test_manual_event_runs_only_named_rule() {
    let manual = |id: &str| {
        rule(
            id,
            json!([
                {"id": "t", "type": "manual", "config": {}},
                {"id": "l", "type": "log", "config": {}}
            ]),
            edges(&[("t", "l")]),
        )
    };
    let h = harness(vec![manual("m1"), manual("m2")], well(600));

    let event = RuleEvent::parse(
        r#"{"type":"manual","tenantId":"acme","assetId":"well-7","assetTypeId":"well","ruleId":"m2"}"#,
    )
    .unwrap();
    let results = h.engine.dispatch_event(&event).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "m2");
}

#[tokio::test]
async fn test_fan_out_respects_single_permit() {
    let rules: Vec<Rule> = (0..5)
        .map(|i| {
            rule(
                &format!("r{}", i),
                json!([
                    {"id": "t", "type": "schedule", "config": {}},
                    {"id": "l", "type": "log", "config": {}}
                ]),
                edges(&[("t", "l")]),
            )
        })
        .collect();
    let log = Arc::new(InMemoryExecutionLogStore::new());
    let engine = RuleEngine::builder(
        Arc::new(InMemoryRuleStore::with_rules(rules)),
        Arc::new(InMemoryAssetRepository::with_assets(vec![well(600)])),
    )
    .execution_log(log.clone())
    .settings(EngineSettings {
        execution_timeout: Duration::from_secs(1),
        max_concurrent_executions: 1,
    })
    .build();

    let event = RuleEvent::parse(
        r#"{"type":"schedule","tenantId":"acme","assetId":"well-7","assetTypeId":"well"}"#,
    )
    .unwrap();
    let results = engine.dispatch_event(&event).await.unwrap();

    let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["r0", "r1", "r2", "r3", "r4"]);
    assert_eq!(log.len(), 5);
}

#[test]
fn test_validation_rejects_incomplete_active_rules() {
    assert!(Validator::validate_rule(&pressure_alarm_rule()).is_ok());

    let no_trigger = rule(
        "no-trigger",
        json!([{"id": "a", "type": "create_alarm", "config": {"alarmCode": "X", "name": "X"}}]),
        json!([]),
    );
    assert!(Validator::validate_rule(&no_trigger).is_err());

    let no_action = rule(
        "no-action",
        json!([
            {"id": "t", "type": "manual", "config": {}},
            {"id": "c", "type": "if", "config": {"expression": "true"}}
        ]),
        edges(&[("t", "c")]),
    );
    assert!(Validator::validate_rule(&no_action).is_err());
}

#[tokio::test]
async fn test_oversized_condition_reads_false() {
    let expression = format!("telemetry.pressure{} > 500", " + 1".repeat(3000));
    let r = rule(
        "oversized",
        json!([
            {"id": "t", "type": "manual", "config": {}},
            {"id": "c", "type": "if", "config": {"expression": expression}},
            {"id": "l", "type": "log", "config": {}}
        ]),
        edges(&[("t", "c"), ("c", "l")]),
    );
    assert!(Validator::validate_rule(&r).is_err());

    let h = harness(vec![r], well(600));
    let result = h
        .engine
        .run_rule("oversized", "well-7", "acme", TriggerKind::Manual, json!({}))
        .await;

    assert!(result.success);
    let outputs = result.result.unwrap()["outputs"].clone();
    assert_eq!(outputs["c"], json!(false));
    assert!(outputs.as_object().unwrap().contains_key("l"));
}
