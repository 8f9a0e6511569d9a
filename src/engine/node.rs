//! Typed node taxonomy.
//!
//! Rules are stored with free-text node types and JSON configuration. Before a
//! walk every [`RuleNodeDefinition`] is compiled into a [`RuleNode`] carrying a
//! [`NodeKind`] with typed configuration, so that handlers never parse config
//! and an unknown type or a missing field fails the walk before any handler
//! runs.
//!
//! | Role | Types |
//! |---|---|
//! | Trigger | `telemetry_change`, `attribute_change`, `status_change`, `schedule`, `manual` |
//! | Condition | `if` |
//! | Transform | `get_telemetry`, `get_attribute`, `math`, `formula` |
//! | Action | `set_computed`, `set_attribute`, `set_status`, `create_alarm`, `log` |

use crate::constants::{
    DEFAULT_ALARM_SEVERITY, DEFAULT_LOG_MESSAGE, NODE_TYPE_ATTRIBUTE_CHANGE,
    NODE_TYPE_CREATE_ALARM, NODE_TYPE_FORMULA, NODE_TYPE_GET_ATTRIBUTE, NODE_TYPE_GET_TELEMETRY,
    NODE_TYPE_IF, NODE_TYPE_LOG, NODE_TYPE_MANUAL, NODE_TYPE_MATH, NODE_TYPE_SCHEDULE,
    NODE_TYPE_SET_ATTRIBUTE, NODE_TYPE_SET_COMPUTED, NODE_TYPE_SET_STATUS,
    NODE_TYPE_STATUS_CHANGE, NODE_TYPE_TELEMETRY_CHANGE,
};
use crate::errors::EngineError;
use crate::storage::rule::RuleNodeDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

type Result<T> = std::result::Result<T, EngineError>;

/// The part a node plays in a rule graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Trigger,
    Condition,
    Transform,
    Action,
}

/// The kind of event that started a walk. Also the type of a trigger node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    TelemetryChange,
    AttributeChange,
    StatusChange,
    Schedule,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::TelemetryChange => NODE_TYPE_TELEMETRY_CHANGE,
            TriggerKind::AttributeChange => NODE_TYPE_ATTRIBUTE_CHANGE,
            TriggerKind::StatusChange => NODE_TYPE_STATUS_CHANGE,
            TriggerKind::Schedule => NODE_TYPE_SCHEDULE,
            TriggerKind::Manual => NODE_TYPE_MANUAL,
        }
    }

    pub fn from_node_type(node_type: &str) -> Option<Self> {
        match node_type {
            NODE_TYPE_TELEMETRY_CHANGE => Some(TriggerKind::TelemetryChange),
            NODE_TYPE_ATTRIBUTE_CHANGE => Some(TriggerKind::AttributeChange),
            NODE_TYPE_STATUS_CHANGE => Some(TriggerKind::StatusChange),
            NODE_TYPE_SCHEDULE => Some(TriggerKind::Schedule),
            NODE_TYPE_MANUAL => Some(TriggerKind::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerConfig {
    pub kind: TriggerKind,
    /// Only fire for this telemetry key (telemetry triggers)
    pub telemetry_key: Option<String>,
    /// Only fire for this attribute key (attribute triggers)
    pub attribute_key: Option<String>,
}

impl TriggerConfig {
    /// True when an event of `kind` carrying `key` should start this trigger.
    pub fn matches(&self, kind: TriggerKind, key: Option<&str>) -> bool {
        if self.kind != kind {
            return false;
        }
        let filter = match kind {
            TriggerKind::TelemetryChange => self.telemetry_key.as_deref(),
            TriggerKind::AttributeChange => self.attribute_key.as_deref(),
            _ => None,
        };
        match filter {
            Some(expected) => key == Some(expected),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionConfig {
    /// Source text, parsed at evaluation time so a malformed expression
    /// evaluates to `false` instead of failing compilation.
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetTelemetryConfig {
    pub telemetry_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetAttributeConfig {
    pub attribute_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOperation {
    pub fn parse(operation: &str) -> Result<Self> {
        match operation {
            "add" => Ok(MathOperation::Add),
            "subtract" => Ok(MathOperation::Subtract),
            "multiply" => Ok(MathOperation::Multiply),
            "divide" => Ok(MathOperation::Divide),
            _ => Err(EngineError::UnknownMathOperation {
                operation: operation.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MathOperation::Add => "add",
            MathOperation::Subtract => "subtract",
            MathOperation::Multiply => "multiply",
            MathOperation::Divide => "divide",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A value written directly in the node config
    Value(Value),
    /// The output of another node, `{"nodeId": "..."}`
    NodeOutput(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MathConfig {
    pub operation: MathOperation,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaConfig {
    pub formula: String,
}

/// Where a SET_* action takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// The config carried a `value` key (an explicit `null` included)
    Literal(Value),
    /// Output of the node named by the first input port, or `null`
    NodeOutput(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetComputedConfig {
    pub field: String,
    pub value: ValueSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAttributeConfig {
    pub attribute: String,
    pub value: ValueSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetStatusConfig {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateAlarmConfig {
    pub alarm_code: String,
    pub name: String,
    pub message: Option<String>,
    pub severity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub message: String,
    pub level: LogLevel,
}

/// Closed set of node kinds with their typed configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger(TriggerConfig),
    If(ConditionConfig),
    GetTelemetry(GetTelemetryConfig),
    GetAttribute(GetAttributeConfig),
    Math(MathConfig),
    Formula(FormulaConfig),
    SetComputed(SetComputedConfig),
    SetAttribute(SetAttributeConfig),
    SetStatus(SetStatusConfig),
    CreateAlarm(CreateAlarmConfig),
    Log(LogConfig),
}

impl NodeKind {
    pub fn role(&self) -> NodeRole {
        match self {
            NodeKind::Trigger(_) => NodeRole::Trigger,
            NodeKind::If(_) => NodeRole::Condition,
            NodeKind::GetTelemetry(_)
            | NodeKind::GetAttribute(_)
            | NodeKind::Math(_)
            | NodeKind::Formula(_) => NodeRole::Transform,
            NodeKind::SetComputed(_)
            | NodeKind::SetAttribute(_)
            | NodeKind::SetStatus(_)
            | NodeKind::CreateAlarm(_)
            | NodeKind::Log(_) => NodeRole::Action,
        }
    }

    /// The stored type name of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Trigger(config) => config.kind.as_str(),
            NodeKind::If(_) => NODE_TYPE_IF,
            NodeKind::GetTelemetry(_) => NODE_TYPE_GET_TELEMETRY,
            NodeKind::GetAttribute(_) => NODE_TYPE_GET_ATTRIBUTE,
            NodeKind::Math(_) => NODE_TYPE_MATH,
            NodeKind::Formula(_) => NODE_TYPE_FORMULA,
            NodeKind::SetComputed(_) => NODE_TYPE_SET_COMPUTED,
            NodeKind::SetAttribute(_) => NODE_TYPE_SET_ATTRIBUTE,
            NodeKind::SetStatus(_) => NODE_TYPE_SET_STATUS,
            NodeKind::CreateAlarm(_) => NODE_TYPE_CREATE_ALARM,
            NodeKind::Log(_) => NODE_TYPE_LOG,
        }
    }
}

/// A compiled node: identifier plus typed kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleNode {
    pub id: String,
    pub kind: NodeKind,
}

impl RuleNode {
    pub fn role(&self) -> NodeRole {
        self.kind.role()
    }

    /// Compiles a stored definition, validating its configuration.
    pub fn compile(definition: &RuleNodeDefinition) -> Result<Self> {
        let node_type = definition.node_type.as_str();
        let config = ConfigReader {
            config: &definition.config,
            node_type,
        };

        let kind = if let Some(trigger) = TriggerKind::from_node_type(node_type) {
            NodeKind::Trigger(TriggerConfig {
                kind: trigger,
                telemetry_key: config.optional_str("telemetryKey")?,
                attribute_key: config.optional_str("attributeKey")?,
            })
        } else {
            match node_type {
                NODE_TYPE_IF => NodeKind::If(ConditionConfig {
                    expression: config.required_str("expression")?,
                }),
                NODE_TYPE_GET_TELEMETRY => NodeKind::GetTelemetry(GetTelemetryConfig {
                    telemetry_key: config.required_str("telemetryKey")?,
                }),
                NODE_TYPE_GET_ATTRIBUTE => NodeKind::GetAttribute(GetAttributeConfig {
                    attribute_key: config.required_str("attributeKey")?,
                }),
                NODE_TYPE_MATH => NodeKind::Math(MathConfig {
                    operation: MathOperation::parse(&config.required_str("operation")?)?,
                    operands: config
                        .required_array("operands")?
                        .iter()
                        .map(compile_operand)
                        .collect(),
                }),
                NODE_TYPE_FORMULA => NodeKind::Formula(FormulaConfig {
                    formula: config.required_str("formula")?,
                }),
                NODE_TYPE_SET_COMPUTED => NodeKind::SetComputed(SetComputedConfig {
                    field: config.required_str("field")?,
                    value: value_source(definition),
                }),
                NODE_TYPE_SET_ATTRIBUTE => NodeKind::SetAttribute(SetAttributeConfig {
                    attribute: config.required_str("attribute")?,
                    value: value_source(definition),
                }),
                NODE_TYPE_SET_STATUS => NodeKind::SetStatus(SetStatusConfig {
                    status: config.required_str("status")?,
                }),
                NODE_TYPE_CREATE_ALARM => NodeKind::CreateAlarm(CreateAlarmConfig {
                    alarm_code: config.required_str("alarmCode")?,
                    name: config.required_str("name")?,
                    message: config.optional_str("message")?,
                    severity: config
                        .optional_str("severity")?
                        .unwrap_or_else(|| DEFAULT_ALARM_SEVERITY.to_string()),
                }),
                NODE_TYPE_LOG => NodeKind::Log(LogConfig {
                    message: config
                        .optional_str("message")?
                        .unwrap_or_else(|| DEFAULT_LOG_MESSAGE.to_string()),
                    level: config.log_level("level")?,
                }),
                _ => {
                    return Err(EngineError::UnknownNodeType {
                        node_type: node_type.to_string(),
                        node_id: definition.id.clone(),
                    });
                }
            }
        };

        Ok(Self {
            id: definition.id.clone(),
            kind,
        })
    }
}

fn compile_operand(operand: &Value) -> Operand {
    match operand.get("nodeId").and_then(Value::as_str) {
        Some(node_id) => Operand::NodeOutput(node_id.to_string()),
        None => Operand::Value(operand.clone()),
    }
}

fn value_source(definition: &RuleNodeDefinition) -> ValueSource {
    match definition.config.get("value") {
        Some(value) => ValueSource::Literal(value.clone()),
        None => ValueSource::NodeOutput(definition.inputs.first().cloned()),
    }
}

struct ConfigReader<'a> {
    config: &'a Map<String, Value>,
    node_type: &'a str,
}

impl ConfigReader<'_> {
    fn missing(&self, field: &str) -> EngineError {
        EngineError::MissingRequiredField {
            field_name: field.to_string(),
            node_type: self.node_type.to_string(),
        }
    }

    fn invalid(&self, field: &str, expected: &str) -> EngineError {
        EngineError::InvalidFieldType {
            field_name: field.to_string(),
            node_type: self.node_type.to_string(),
            expected_type: expected.to_string(),
        }
    }

    /// Absent, `null` and empty strings all read as "not set".
    fn optional_str(&self, field: &str) -> Result<Option<String>> {
        match self.config.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(field, "string")),
        }
    }

    fn required_str(&self, field: &str) -> Result<String> {
        self.optional_str(field)?.ok_or_else(|| self.missing(field))
    }

    fn required_array(&self, field: &str) -> Result<&Vec<Value>> {
        match self.config.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(self.invalid(field, "array")),
        }
    }

    fn log_level(&self, field: &str) -> Result<LogLevel> {
        match self.optional_str(field)?.as_deref() {
            None | Some("info") => Ok(LogLevel::Info),
            Some("debug") => Ok(LogLevel::Debug),
            Some("warn") | Some("warning") => Ok(LogLevel::Warn),
            Some("error") => Ok(LogLevel::Error),
            Some(_) => Err(self.invalid(field, "one of debug, info, warn, error")),
        }
    }
}
