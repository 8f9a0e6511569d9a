//! Collaborator contracts for rules, assets and execution records, with the
//! in-memory and file-backed implementations bundled with the engine.

pub mod asset;
pub mod execution_log;
pub mod rule;

pub use crate::errors::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

pub use asset::{AssetRepository, AssetSnapshot, AssetUpdate, InMemoryAssetRepository};
pub use execution_log::{
    ActionExecuted, ExecutionLogStore, ExecutionRecord, ExecutionStats,
    FilesystemExecutionLogStore, InMemoryExecutionLogStore, NoopExecutionLogStore,
    TracingExecutionLogStore,
};
pub use rule::{
    InMemoryRuleStore, NodePosition, Rule, RuleEdge, RuleNodeDefinition, RuleSettings,
    RuleStatus, RuleStore,
};
