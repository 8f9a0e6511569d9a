//! # assetrules
//!
//! assetrules is a reactive rule engine for industrial asset management. Tenants
//! author rules as small graphs of nodes; whenever telemetry, an attribute or a
//! status of an asset changes (or a schedule fires, or someone runs a rule by
//! hand) the engine walks the matching rules against the asset's current state.
//!
//! ## Architecture Overview
//!
//! ### Rules
//! - A rule is a set of typed nodes joined by directed edges
//! - Rules apply to asset types, optionally narrowed to specific assets
//! - Only `ACTIVE` rules run; priority decides which start first
//!
//! ### Node Types
//! - **Triggers**: `telemetry_change`, `attribute_change`, `status_change`, `schedule`, `manual`
//! - **Conditions**: `if`, using a small expression language over asset state
//! - **Transforms**: `get_telemetry`, `get_attribute`, `math`, `formula`
//! - **Actions**: `set_computed`, `set_attribute`, `set_status`, `create_alarm`, `log`
//!
//! ### Execution
//! - Depth-first walk from the trigger node, following edges in order
//! - Every invocation writes exactly one execution record
//! - Each walk runs under a deadline; cycles fail the walk
//!
//! ## Configuration
//!
//! The binary is configured through environment variables, see [`config::Config`].
//!
//! ## Error Handling
//!
//! All error strings use the format: `error-assetrules-<domain>-<number> <message>: <details>`
//!
//! ## Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use assetrules::consumer::RuleEvent;
//! use assetrules::engine::RuleEngine;
//! use assetrules::storage::{InMemoryAssetRepository, InMemoryRuleStore};
//!
//! let engine = RuleEngine::builder(
//!     Arc::new(InMemoryRuleStore::with_rules(rules)),
//!     Arc::new(InMemoryAssetRepository::with_assets(assets)),
//! )
//! .build();
//!
//! let event = RuleEvent::parse(line)?;
//! for (rule_id, result) in engine.dispatch_event(&event).await? {
//!     println!("{rule_id}: {}", result.success);
//! }
//! ```

/// Alarm requests raised by rules and the sinks that receive them.
pub mod alarm;

/// Computed-field evaluation backing `formula` nodes.
pub mod computed;

/// Environment-driven configuration for the binary and the engine.
pub mod config;

pub(crate) mod constants;

/// Asset events and the consumer that dispatches them to the engine.
pub mod consumer;

/// Rule compilation, graph walking, node handlers and execution recording.
pub mod engine;

pub mod errors;

/// Metrics publishing (statsd or no-op).
pub mod metrics;

/// Storage contracts for rules, assets and execution records, with bundled
/// implementations.
pub mod storage;

/// Background task lifecycle helpers for the binary.
pub mod tasks;

/// Authoring-time validation of rule graphs.
pub mod validation;

#[cfg(test)]
pub mod test_helpers;
