//! Core trait implemented by every node handler.
//!
//! The dispatcher owns one handler per node family and picks the right one with
//! an exhaustive match over [`crate::engine::node::NodeKind`]. Each handler
//! receives the typed configuration of the node being visited and a shared
//! reference to the walk's [`ExecutionContext`].
//!
//! # Evaluation flow
//!
//! 1. The dispatcher visits a node and hands its configuration to the handler
//! 2. The handler reads the trigger payload, the asset snapshot or earlier
//!    node outputs from the context, and performs any side effect
//! 3. The returned value is stored as the node's output under its id
//! 4. An error aborts the walk; nothing after the failing node runs
//!
//! # Example
//!
//! ```rust,ignore
//! use assetrules::engine::context::ExecutionContext;
//! use assetrules::engine::evaluator::NodeEvaluator;
//! use assetrules::errors::EngineError;
//! use async_trait::async_trait;
//! use serde_json::Value;
//!
//! struct EchoPayload;
//!
//! #[async_trait]
//! impl NodeEvaluator for EchoPayload {
//!     type Config = ();
//!
//!     async fn evaluate(
//!         &self,
//!         _node_id: &str,
//!         _config: &(),
//!         context: &ExecutionContext,
//!     ) -> Result<Value, EngineError> {
//!         Ok(context.trigger_payload.clone())
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::errors::EngineError;

/// Behaviour of one node family.
///
/// Implementors must be `Send + Sync`: a single handler instance is shared by
/// every walk the engine runs concurrently.
#[async_trait]
pub trait NodeEvaluator: Send + Sync {
    /// Typed configuration of the nodes this handler evaluates
    type Config: Send + Sync;

    /// Evaluates one node visit and returns its output.
    ///
    /// Action handlers return `Value::Null`; side effects go through the
    /// collaborators the handler was built with.
    async fn evaluate(
        &self,
        node_id: &str,
        config: &Self::Config,
        context: &ExecutionContext,
    ) -> Result<Value, EngineError>;
}
