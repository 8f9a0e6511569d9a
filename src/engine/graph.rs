//! Compiled form of a rule.
//!
//! Compilation turns every stored node definition into a typed
//! [`crate::engine::node::RuleNode`] and builds successor lists in edge-list
//! order. Edges naming unknown nodes are logged and dropped.

use crate::engine::node::{NodeKind, NodeRole, RuleNode, TriggerConfig};
use crate::errors::EngineError;
use crate::storage::rule::Rule;
use std::collections::HashMap;
use tracing::warn;

/// A rule compiled for execution: typed nodes plus an adjacency list that
/// keeps the rule's edge order.
#[derive(Debug, Clone)]
pub struct RuleGraph {
    nodes: Vec<RuleNode>,
    index: HashMap<String, usize>,
    successors: Vec<Vec<usize>>,
}

impl RuleGraph {
    /// Compiles every node of the rule. Fails on the first node whose
    /// configuration is invalid. Edges that reference unknown nodes are
    /// dropped with a warning.
    pub fn compile(rule: &Rule) -> Result<Self, EngineError> {
        let nodes = rule
            .nodes
            .iter()
            .map(RuleNode::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            index.entry(node.id.clone()).or_insert(position);
        }

        let mut successors = vec![Vec::new(); nodes.len()];
        for edge in &rule.connections {
            let Some(&from) = index.get(&edge.from_node) else {
                warn!(
                    rule.id = %rule.id,
                    edge.id = %edge.id,
                    node.id = %edge.from_node,
                    "Skipping edge from unknown node"
                );
                continue;
            };
            let Some(&to) = index.get(&edge.to_node) else {
                warn!(
                    rule.id = %rule.id,
                    edge.id = %edge.id,
                    node.id = %edge.to_node,
                    "Skipping edge to unknown node"
                );
                continue;
            };
            successors[from].push(to);
        }

        Ok(Self {
            nodes,
            index,
            successors,
        })
    }

    pub fn nodes(&self) -> &[RuleNode] {
        &self.nodes
    }

    pub fn node(&self, position: usize) -> &RuleNode {
        &self.nodes[position]
    }

    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    /// Successor positions of a node, in edge-list order.
    pub fn successors(&self, position: usize) -> &[usize] {
        &self.successors[position]
    }

    /// The entry point of a walk: the first trigger node in node-list order.
    pub fn trigger(&self) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.role() == NodeRole::Trigger)
    }

    /// All trigger configurations, in node-list order.
    pub fn triggers(&self) -> impl Iterator<Item = &TriggerConfig> {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::Trigger(config) => Some(config),
            _ => None,
        })
    }

    /// Marks every node reachable from `start`, `start` included.
    pub fn reachable_from(&self, start: usize) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(position) = stack.pop() {
            if std::mem::replace(&mut seen[position], true) {
                continue;
            }
            stack.extend(self.successors[position].iter().copied());
        }
        seen
    }

    /// Returns the id of a node that lies on a cycle, if any.
    pub fn find_cycle(&self) -> Option<&str> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // (node, next successor to look at)
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::OnPath;
            while let Some((position, cursor)) = stack.pop() {
                match self.successors[position].get(cursor) {
                    Some(&next) => {
                        stack.push((position, cursor + 1));
                        match marks[next] {
                            Mark::OnPath => return Some(self.nodes[next].id.as_str()),
                            Mark::Unvisited => {
                                marks[next] = Mark::OnPath;
                                stack.push((next, 0));
                            }
                            Mark::Done => {}
                        }
                    }
                    None => marks[position] = Mark::Done,
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(nodes: serde_json::Value, connections: serde_json::Value) -> Rule {
        serde_json::from_value(json!({
            "id": "r1",
            "tenantId": "t1",
            "name": "graph",
            "status": "ACTIVE",
            "appliesToAssetTypes": ["well"],
            "nodes": nodes,
            "connections": connections
        }))
        .unwrap()
    }

    fn edge(from: &str, to: &str) -> serde_json::Value {
        json!({"id": format!("{from}-{to}"), "fromNode": from, "fromPort": "out", "toNode": to, "toPort": "in"})
    }

    #[test]
    fn test_first_trigger_wins() {
        let graph = RuleGraph::compile(&rule(
            json!([
                {"id": "log", "type": "log", "config": {}},
                {"id": "manual", "type": "manual", "config": {}},
                {"id": "schedule", "type": "schedule", "config": {}}
            ]),
            json!([]),
        ))
        .unwrap();

        let trigger = graph.trigger().unwrap();
        assert_eq!(graph.node(trigger).id, "manual");
        assert_eq!(graph.triggers().count(), 2);
    }

    #[test]
    fn test_successors_keep_edge_order_and_skip_dangling() {
        let graph = RuleGraph::compile(&rule(
            json!([
                {"id": "t", "type": "manual", "config": {}},
                {"id": "a", "type": "log", "config": {}},
                {"id": "b", "type": "log", "config": {}}
            ]),
            json!([edge("t", "b"), edge("t", "ghost"), edge("t", "a")]),
        ))
        .unwrap();

        let t = graph.position("t").unwrap();
        let ids: Vec<&str> = graph
            .successors(t)
            .iter()
            .map(|&p| graph.node(p).id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_invalid_node_fails_compilation() {
        let err = RuleGraph::compile(&rule(
            json!([{"id": "m", "type": "math", "config": {"operation": "pow", "operands": []}}]),
            json!([]),
        ))
        .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_cycle_detection_ignores_diamonds() {
        let nodes = json!([
            {"id": "t", "type": "manual", "config": {}},
            {"id": "a", "type": "log", "config": {}},
            {"id": "b", "type": "log", "config": {}},
            {"id": "c", "type": "log", "config": {}}
        ]);

        let diamond = RuleGraph::compile(&rule(
            nodes.clone(),
            json!([edge("t", "a"), edge("t", "b"), edge("a", "c"), edge("b", "c")]),
        ))
        .unwrap();
        assert_eq!(diamond.find_cycle(), None);

        let cyclic = RuleGraph::compile(&rule(
            nodes,
            json!([edge("t", "a"), edge("a", "b"), edge("b", "a")]),
        ))
        .unwrap();
        assert!(matches!(cyclic.find_cycle(), Some("a") | Some("b")));
    }

    #[test]
    fn test_reachability() {
        let graph = RuleGraph::compile(&rule(
            json!([
                {"id": "t", "type": "manual", "config": {}},
                {"id": "a", "type": "log", "config": {}},
                {"id": "island", "type": "log", "config": {}}
            ]),
            json!([edge("t", "a")]),
        ))
        .unwrap();

        let reachable = graph.reachable_from(graph.trigger().unwrap());
        assert_eq!(reachable, vec![true, true, false]);
    }
}
