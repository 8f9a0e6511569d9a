//! Authoring-time validation of rule graphs.
//!
//! The engine never runs these checks itself: a rule that fails them still
//! executes (and fails) the way the dispatcher dictates. They exist for the
//! places rules enter the system, such as the binary's rule loader.

use std::collections::HashSet;

use crate::engine::expression::Expression;
use crate::engine::graph::RuleGraph;
use crate::engine::node::{NodeKind, NodeRole, RuleNode};
use crate::errors::ValidationError;
use crate::storage::rule::Rule;

pub struct Validator;

impl Validator {
    /// Validates a rule's graph.
    ///
    /// Every rule must satisfy:
    /// 1. Node ids are unique
    /// 2. Every edge connects two nodes of the rule
    /// 3. Every node has a known type and valid configuration
    /// 4. Every condition expression parses
    /// 5. The graph has no cycle
    ///
    /// An `ACTIVE` rule must also:
    /// 6. Contain a trigger node
    /// 7. Reach at least one action node from its first trigger
    pub fn validate_rule(rule: &Rule) -> Result<(), ValidationError> {
        let mut seen = HashSet::with_capacity(rule.nodes.len());
        for node in &rule.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
        }

        for edge in &rule.connections {
            for endpoint in [&edge.from_node, &edge.to_node] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(ValidationError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        let graph = RuleGraph::compile(rule)
            .map_err(|source| ValidationError::InvalidNode { source })?;

        for node in graph.nodes() {
            Self::validate_node(node)?;
        }

        if let Some(node_id) = graph.find_cycle() {
            return Err(ValidationError::Cycle {
                node_id: node_id.to_string(),
            });
        }

        if rule.is_active() {
            let start = graph.trigger().ok_or_else(|| ValidationError::InvalidRuleStructure {
                details: "an active rule must contain a trigger node".to_string(),
            })?;

            let reachable = graph.reachable_from(start);
            let reaches_action = graph
                .nodes()
                .iter()
                .zip(reachable)
                .any(|(node, reached)| reached && node.role() == NodeRole::Action);
            if !reaches_action {
                return Err(ValidationError::InvalidRuleStructure {
                    details: format!(
                        "no action node is reachable from trigger '{}'",
                        graph.node(start).id
                    ),
                });
            }
        }

        Ok(())
    }

    /// Checks that the compiler leaves to run time.
    fn validate_node(node: &RuleNode) -> Result<(), ValidationError> {
        if let NodeKind::If(config) = &node.kind {
            Expression::parse(&config.expression).map_err(|source| {
                ValidationError::InvalidExpression {
                    node_id: node.id.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}
