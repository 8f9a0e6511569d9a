//! Depth-first graph walker.
//!
//! A walk starts at the rule's trigger node and visits nodes in pre-order:
//! each node's handler runs and its output is stored, then the targets of its
//! outgoing edges are visited in edge-list order. Every branch shares one
//! [`ExecutionContext`], so a later branch sees the outputs of earlier ones.
//!
//! A node reachable along two paths runs once per path. Entering a node that
//! is already on the current path fails the walk with
//! [`EngineError::CycleDetected`].

use ordermap::OrderMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::alarm::AlarmSink;
use crate::computed::ComputedFieldEvaluator;
use crate::constants::{SKIP_REASON_ASSET_SCOPE, SKIP_REASON_ASSET_TYPE};
use crate::engine::context::ExecutionContext;
use crate::engine::graph::RuleGraph;
use crate::engine::node::{NodeKind, RuleNode, TriggerKind};
use crate::errors::EngineError;
use crate::storage::asset::AssetRepository;
use crate::storage::rule::Rule;

use super::evaluator::NodeEvaluator;
use super::node_type_create_alarm::CreateAlarmEvaluator;
use super::node_type_formula::FormulaEvaluator;
use super::node_type_get_value::{GetAttributeEvaluator, GetTelemetryEvaluator};
use super::node_type_if::IfEvaluator;
use super::node_type_log::LogEvaluator;
use super::node_type_math::MathEvaluator;
use super::node_type_set_value::{SetAttributeEvaluator, SetComputedEvaluator, SetStatusEvaluator};
use super::node_type_trigger::TriggerEvaluator;

/// How a walk ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkOutcome {
    /// Every reachable node ran. Outputs are keyed by node id in first-visit order.
    Completed { outputs: OrderMap<String, Value> },
    /// The rule does not apply to the asset; no handler ran.
    Skipped { reason: String },
}

enum Frame {
    Enter(usize),
    Exit(usize),
}

/// Runs one rule against one asset.
///
/// Owns one handler per node family; the handlers that touch the outside
/// world share the collaborators given to [`RuleDispatcher::new`].
pub struct RuleDispatcher {
    assets: Arc<dyn AssetRepository>,
    default_timeout: Duration,
    trigger: TriggerEvaluator,
    condition: IfEvaluator,
    get_telemetry: GetTelemetryEvaluator,
    get_attribute: GetAttributeEvaluator,
    math: MathEvaluator,
    formula: FormulaEvaluator,
    set_computed: SetComputedEvaluator,
    set_attribute: SetAttributeEvaluator,
    set_status: SetStatusEvaluator,
    create_alarm: CreateAlarmEvaluator,
    log: LogEvaluator,
}

impl RuleDispatcher {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        computed: Arc<dyn ComputedFieldEvaluator>,
        alarms: Arc<dyn AlarmSink>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            trigger: TriggerEvaluator::new(),
            condition: IfEvaluator::new(),
            get_telemetry: GetTelemetryEvaluator::new(),
            get_attribute: GetAttributeEvaluator::new(),
            math: MathEvaluator::new(),
            formula: FormulaEvaluator::new(computed),
            set_computed: SetComputedEvaluator::new(assets.clone()),
            set_attribute: SetAttributeEvaluator::new(assets.clone()),
            set_status: SetStatusEvaluator::new(assets.clone()),
            create_alarm: CreateAlarmEvaluator::new(alarms),
            log: LogEvaluator::new(),
            assets,
            default_timeout,
        }
    }

    /// Deadline for one walk of `rule`: its own `timeoutMs` when set and
    /// positive, the engine default otherwise.
    pub fn timeout_for(&self, rule: &Rule) -> Duration {
        rule.config
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    /// Loads the asset, re-checks applicability, compiles the rule and walks
    /// it from its trigger node, all under the rule's deadline.
    pub async fn run(
        &self,
        rule: &Rule,
        asset_id: &str,
        tenant_id: &str,
        trigger_kind: TriggerKind,
        trigger_payload: Value,
    ) -> Result<WalkOutcome, EngineError> {
        let timeout = self.timeout_for(rule);
        let deadline = Instant::now() + timeout;
        let walk = self.walk(rule, asset_id, tenant_id, trigger_kind, trigger_payload, deadline);

        let result = match tokio::time::timeout(timeout, walk).await {
            Ok(result) => result,
            Err(_) => Err(timed_out(timeout)),
        };
        if let Err(EngineError::Timeout { timeout_ms }) = &result {
            warn!(
                rule.id = %rule.id,
                asset.id = asset_id,
                timeout_ms = *timeout_ms,
                "Rule execution timed out"
            );
        }
        result
    }

    async fn walk(
        &self,
        rule: &Rule,
        asset_id: &str,
        tenant_id: &str,
        trigger_kind: TriggerKind,
        trigger_payload: Value,
        deadline: Instant,
    ) -> Result<WalkOutcome, EngineError> {
        let asset = self
            .assets
            .find_by_id(tenant_id, asset_id)
            .await?
            .ok_or_else(|| EngineError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;

        if !rule.applies_to_asset_type(&asset.asset_type_id) {
            return Ok(skipped(rule, asset_id, SKIP_REASON_ASSET_TYPE));
        }
        if !rule.applies_to_asset(asset_id) {
            return Ok(skipped(rule, asset_id, SKIP_REASON_ASSET_SCOPE));
        }

        let graph = RuleGraph::compile(rule)?;
        let start = graph.trigger().ok_or(EngineError::MissingTrigger)?;
        let mut context = ExecutionContext::new(&rule.id, asset, trigger_kind, trigger_payload);

        let mut on_path = vec![false; graph.nodes().len()];
        let mut stack = vec![Frame::Enter(start)];

        while let Some(frame) = stack.pop() {
            let position = match frame {
                Frame::Exit(position) => {
                    on_path[position] = false;
                    continue;
                }
                Frame::Enter(position) => position,
            };

            let node = graph.node(position);
            if on_path[position] {
                return Err(EngineError::CycleDetected {
                    node_id: node.id.clone(),
                });
            }
            on_path[position] = true;
            stack.push(Frame::Exit(position));

            // Handlers that never suspend would otherwise outrun the timer.
            let started = Instant::now();
            if started >= deadline {
                return Err(timed_out(self.timeout_for(rule)));
            }

            let output = self.evaluate_node(node, &context).await?;

            debug!(
                rule.id = %rule.id,
                node.id = %node.id,
                node.type = node.kind.type_name(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Node evaluated"
            );

            let halt = rule.config.branch_on_false
                && matches!(node.kind, NodeKind::If(_))
                && output == Value::Bool(false);
            context.record_output(&node.id, output);

            if halt {
                debug!(rule.id = %rule.id, node.id = %node.id, "Condition false, branch stopped");
                continue;
            }
            // Reversed so the first edge is popped first.
            for &next in graph.successors(position).iter().rev() {
                stack.push(Frame::Enter(next));
            }
        }

        Ok(WalkOutcome::Completed {
            outputs: context.into_outputs(),
        })
    }

    async fn evaluate_node(
        &self,
        node: &RuleNode,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let id = node.id.as_str();
        match &node.kind {
            NodeKind::Trigger(config) => self.trigger.evaluate(id, config, context).await,
            NodeKind::If(config) => self.condition.evaluate(id, config, context).await,
            NodeKind::GetTelemetry(config) => self.get_telemetry.evaluate(id, config, context).await,
            NodeKind::GetAttribute(config) => self.get_attribute.evaluate(id, config, context).await,
            NodeKind::Math(config) => self.math.evaluate(id, config, context).await,
            NodeKind::Formula(config) => self.formula.evaluate(id, config, context).await,
            NodeKind::SetComputed(config) => self.set_computed.evaluate(id, config, context).await,
            NodeKind::SetAttribute(config) => self.set_attribute.evaluate(id, config, context).await,
            NodeKind::SetStatus(config) => self.set_status.evaluate(id, config, context).await,
            NodeKind::CreateAlarm(config) => self.create_alarm.evaluate(id, config, context).await,
            NodeKind::Log(config) => self.log.evaluate(id, config, context).await,
        }
    }
}

fn timed_out(timeout: Duration) -> EngineError {
    EngineError::Timeout {
        timeout_ms: timeout.as_millis() as u64,
    }
}

fn skipped(rule: &Rule, asset_id: &str, reason: &str) -> WalkOutcome {
    debug!(rule.id = %rule.id, asset.id = asset_id, reason, "Rule does not apply to asset");
    WalkOutcome::Skipped {
        reason: reason.to_string(),
    }
}
