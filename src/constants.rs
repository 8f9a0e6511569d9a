//! Application-wide constants

/// Node type identifiers as stored in rule definitions
pub(crate) const NODE_TYPE_TELEMETRY_CHANGE: &str = "telemetry_change";
pub(crate) const NODE_TYPE_ATTRIBUTE_CHANGE: &str = "attribute_change";
pub(crate) const NODE_TYPE_STATUS_CHANGE: &str = "status_change";
pub(crate) const NODE_TYPE_SCHEDULE: &str = "schedule";
pub(crate) const NODE_TYPE_MANUAL: &str = "manual";
pub(crate) const NODE_TYPE_IF: &str = "if";
pub(crate) const NODE_TYPE_GET_TELEMETRY: &str = "get_telemetry";
pub(crate) const NODE_TYPE_GET_ATTRIBUTE: &str = "get_attribute";
pub(crate) const NODE_TYPE_MATH: &str = "math";
pub(crate) const NODE_TYPE_FORMULA: &str = "formula";
pub(crate) const NODE_TYPE_SET_COMPUTED: &str = "set_computed";
pub(crate) const NODE_TYPE_SET_ATTRIBUTE: &str = "set_attribute";
pub(crate) const NODE_TYPE_SET_STATUS: &str = "set_status";
pub(crate) const NODE_TYPE_CREATE_ALARM: &str = "create_alarm";
pub(crate) const NODE_TYPE_LOG: &str = "log";

/// Skip reasons reported when a rule does not apply to an asset
pub(crate) const SKIP_REASON_ASSET_TYPE: &str = "Asset type mismatch";
pub(crate) const SKIP_REASON_ASSET_SCOPE: &str = "Asset not in scope";

/// Defaults shared by configuration and rule settings
pub(crate) const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 5000;
pub(crate) const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 8;
pub(crate) const DEFAULT_EVENT_QUEUE_SIZE: usize = 1000;
pub(crate) const DEFAULT_LOG_MESSAGE: &str = "Rule execution log";
pub(crate) const DEFAULT_ALARM_SEVERITY: &str = "MEDIUM";

/// Metric keys
pub(crate) const METRIC_RULE_EXECUTION: &str = "rule.execution";
pub(crate) const METRIC_RULE_EXECUTION_DURATION: &str = "rule.execution.duration";
pub(crate) const METRIC_RULE_EVENT: &str = "rule.event";
pub(crate) const METRIC_RULE_DISPATCH_CANDIDATES: &str = "rule.dispatch.candidates";
pub(crate) const METRIC_RULE_EVENT_RULES: &str = "rule.event.rules";
pub(crate) const METRIC_RULE_EVENT_FAILURES: &str = "rule.event.failures";
