//! Rule execution engine.
//!
//! A stored [`crate::storage::rule::Rule`] is compiled into a
//! [`graph::RuleGraph`] of typed [`node::NodeKind`] values, walked depth-first by
//! the [`dispatcher::RuleDispatcher`] and recorded by the
//! [`recorder::ExecutionRecorder`]. [`service::RuleEngine`] is the entry point
//! that ties them to the rule store.
//!
//! Each node family has its own handler module:
//!
//! - `node_type_trigger`: passes the trigger payload through
//! - `node_type_if`: evaluates a condition [`expression`]
//! - `node_type_get_value`: reads telemetry and attributes from the snapshot
//! - `node_type_math` and `node_type_formula`: compute values
//! - `node_type_set_value`: writes attributes, computed values and status
//! - `node_type_create_alarm` and `node_type_log`: side effects

pub(crate) mod common;
pub mod context;
pub mod dispatcher;
pub mod evaluator;
pub mod expression;
pub mod graph;
pub mod node;
pub mod recorder;
pub mod service;

pub mod node_type_create_alarm;
pub mod node_type_formula;
pub mod node_type_get_value;
pub mod node_type_if;
pub mod node_type_log;
pub mod node_type_math;
pub mod node_type_set_value;
pub mod node_type_trigger;

pub use dispatcher::{RuleDispatcher, WalkOutcome};
pub use recorder::RunResult;
pub use service::{EngineSettings, RuleEngine, RuleEngineBuilder};
