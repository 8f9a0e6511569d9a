use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error-assetrules-config-1 Required environment variable not set: {var_name}")]
    EnvVarRequired { var_name: String },

    #[error("error-assetrules-config-2 Version not available")]
    VersionNotAvailable,

    #[error("error-assetrules-config-3 Invalid timeout value: {value}")]
    InvalidTimeout { value: String },

    #[error("error-assetrules-config-4 Invalid concurrency limit: {value}")]
    InvalidConcurrency { value: String },

    #[error("error-assetrules-config-5 Invalid value: {details}")]
    InvalidValue { details: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("error-assetrules-engine-1 Rule not found or inactive: {rule_id}")]
    RuleNotFound { rule_id: String },

    #[error("error-assetrules-engine-2 Asset not found: {asset_id}")]
    AssetNotFound { asset_id: String },

    #[error("error-assetrules-engine-3 No trigger node found in rule")]
    MissingTrigger,

    #[error("error-assetrules-engine-4 Unknown node type: {node_type} at {node_id}")]
    UnknownNodeType { node_type: String, node_id: String },

    #[error("error-assetrules-engine-5 Missing required field: {field_name} in {node_type}")]
    MissingRequiredField {
        field_name: String,
        node_type: String,
    },

    #[error(
        "error-assetrules-engine-6 Invalid field type: {field_name} in {node_type}, expected {expected_type}"
    )]
    InvalidFieldType {
        field_name: String,
        node_type: String,
        expected_type: String,
    },

    #[error("error-assetrules-engine-7 Unknown math operation: {operation}")]
    UnknownMathOperation { operation: String },

    #[error("error-assetrules-engine-8 Operand is not numeric: {operand}")]
    NonNumericOperand { operand: String },

    #[error("error-assetrules-engine-9 Division by zero in {node_id}")]
    DivisionByZero { node_id: String },

    #[error("error-assetrules-engine-10 Math node {node_id} needs at least one operand for {operation}")]
    EmptyOperands { node_id: String, operation: String },

    #[error("error-assetrules-engine-11 Formula evaluation failed: {formula}: {details}")]
    FormulaFailed { formula: String, details: String },

    #[error("error-assetrules-engine-12 Cycle detected at node {node_id}")]
    CycleDetected { node_id: String },

    #[error("error-assetrules-engine-13 Rule execution exceeded {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("error-assetrules-engine-14 Execution permit unavailable: {details}")]
    PermitUnavailable { details: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Configuration errors come from the rule definition itself and will fail
    /// every walk until the rule is edited.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::MissingTrigger
                | EngineError::UnknownNodeType { .. }
                | EngineError::MissingRequiredField { .. }
                | EngineError::InvalidFieldType { .. }
                | EngineError::UnknownMathOperation { .. }
                | EngineError::CycleDetected { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("error-assetrules-expression-1 Unexpected character '{character}' at {position}")]
    UnexpectedCharacter { character: char, position: usize },

    #[error("error-assetrules-expression-2 Unterminated string starting at {position}")]
    UnterminatedString { position: usize },

    #[error("error-assetrules-expression-3 Invalid number literal: {literal}")]
    InvalidNumber { literal: String },

    #[error("error-assetrules-expression-4 Unexpected token: {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("error-assetrules-expression-5 Unknown identifier: {name}")]
    UnknownIdentifier { name: String },

    #[error("error-assetrules-expression-6 Cannot read property '{property}' of {target}")]
    PropertyAccess { property: String, target: String },

    #[error("error-assetrules-expression-7 Type mismatch: {details}")]
    TypeMismatch { details: String },

    #[error("error-assetrules-expression-8 Division by zero")]
    DivisionByZero,

    #[error("error-assetrules-expression-9 Expression is nested too deeply")]
    TooDeep,
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("error-assetrules-validation-1 Invalid rule structure: {details}")]
    InvalidRuleStructure { details: String },

    #[error("error-assetrules-validation-2 Duplicate node id: {node_id}")]
    DuplicateNodeId { node_id: String },

    #[error("error-assetrules-validation-3 Edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("error-assetrules-validation-4 Invalid node: {source}")]
    InvalidNode {
        #[source]
        source: EngineError,
    },

    #[error("error-assetrules-validation-5 Rule graph contains a cycle through {node_id}")]
    Cycle { node_id: String },

    #[error("error-assetrules-validation-6 Invalid condition expression in {node_id}: {source}")]
    InvalidExpression {
        node_id: String,
        #[source]
        source: ExpressionError,
    },
}

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("error-assetrules-consumer-1 Event could not be parsed: {details}")]
    InvalidEvent { details: String },

    #[error("error-assetrules-consumer-2 Event input failed: {details}")]
    InputFailed { details: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("error-assetrules-storage-1 Storage unavailable: {details}")]
    Unavailable { details: String },

    #[error("error-assetrules-storage-2 Write rejected: {details}")]
    WriteRejected { details: String },

    #[error("error-assetrules-storage-3 Invalid input data: {details}")]
    InvalidInput { details: String },

    #[error("error-assetrules-storage-4 I/O failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("error-assetrules-storage-5 Serialization failed: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}
