use crate::constants::{
    DEFAULT_EVENT_QUEUE_SIZE, DEFAULT_EXECUTION_TIMEOUT_MS, DEFAULT_MAX_CONCURRENT_EXECUTIONS,
};
use crate::errors::ConfigError;
use std::time::Duration;

type Result<T> = std::result::Result<T, ConfigError>;

/// Default deadline for a single rule walk.
///
/// Applies whenever a rule does not carry its own `timeoutMs` setting.
#[derive(Clone, Debug)]
pub struct ExecutionTimeout(Duration);

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_EXECUTION_TIMEOUT_MS))
    }
}

impl TryFrom<String> for ExecutionTimeout {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        let millis = value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTimeout {
                value: value.clone(),
            })?;

        if millis == 0 {
            return Err(ConfigError::InvalidTimeout { value });
        }

        Ok(Self(Duration::from_millis(millis)))
    }
}

impl AsRef<Duration> for ExecutionTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

/// Upper bound on rules executed concurrently for one event.
#[derive(Clone, Debug)]
pub struct MaxConcurrentExecutions(usize);

impl Default for MaxConcurrentExecutions {
    fn default() -> Self {
        Self(DEFAULT_MAX_CONCURRENT_EXECUTIONS)
    }
}

impl TryFrom<String> for MaxConcurrentExecutions {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        match value.parse::<usize>() {
            Ok(limit) if limit > 0 => Ok(Self(limit)),
            _ => Err(ConfigError::InvalidConcurrency { value }),
        }
    }
}

impl AsRef<usize> for MaxConcurrentExecutions {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

/// Buffer size of the channel between the event reader and the consumer.
#[derive(Clone, Debug)]
pub struct EventQueueSize(usize);

impl Default for EventQueueSize {
    fn default() -> Self {
        Self(DEFAULT_EVENT_QUEUE_SIZE)
    }
}

impl TryFrom<String> for EventQueueSize {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        let size = value
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                details: format!("Invalid event queue size: {}", value),
            })?;

        if size < 10 {
            return Err(ConfigError::InvalidValue {
                details: "Event queue size must be at least 10".to_string(),
            });
        }

        Ok(Self(size))
    }
}

impl AsRef<usize> for EventQueueSize {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

/// Backend used to persist execution records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExecutionLogStorageType {
    #[default]
    Tracing,
    Memory,
    Filesystem,
    Noop,
}

impl TryFrom<String> for ExecutionLogStorageType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "tracing" => Ok(Self::Tracing),
            "memory" => Ok(Self::Memory),
            "filesystem" => Ok(Self::Filesystem),
            "noop" => Ok(Self::Noop),
            _ => Err(ConfigError::InvalidValue {
                details: format!(
                    "Invalid EXECUTION_LOG_STORAGE_TYPE '{}'. Must be 'tracing', 'memory', 'filesystem', or 'noop'",
                    value
                ),
            }),
        }
    }
}

/// Configuration for execution record storage
#[derive(Clone, Debug, Default)]
pub struct ExecutionLogStorageConfig {
    pub storage_type: ExecutionLogStorageType,
    /// Base directory for filesystem storage (required if storage_type is filesystem)
    pub filesystem_base_directory: Option<String>,
}

impl ExecutionLogStorageConfig {
    pub fn from_env() -> Result<Self> {
        let storage_type: ExecutionLogStorageType =
            default_env("EXECUTION_LOG_STORAGE_TYPE", "tracing").try_into()?;

        let directory = optional_env("EXECUTION_LOG_DIRECTORY");
        let filesystem_base_directory = if directory.is_empty() {
            None
        } else {
            Some(directory)
        };

        let config = Self {
            storage_type,
            filesystem_base_directory,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_type == ExecutionLogStorageType::Filesystem
            && self.filesystem_base_directory.is_none()
        {
            return Err(ConfigError::EnvVarRequired {
                var_name: "EXECUTION_LOG_DIRECTORY".to_string(),
            });
        }

        tracing::info!(
            storage.type = ?self.storage_type,
            storage.directory = ?self.filesystem_base_directory,
            "Execution log storage configured"
        );

        Ok(())
    }
}

/// Main configuration for the rule engine service.
///
/// Loaded from environment variables by [`Config::new`]. Required variables
/// cause startup to fail if not provided.
///
/// ```rust,ignore
/// use assetrules::config::Config;
///
/// let config = Config::new()?;
/// println!("Default timeout: {:?}", config.execution_timeout.as_ref());
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub execution_timeout: ExecutionTimeout,
    pub max_concurrent_executions: MaxConcurrentExecutions,
    pub execution_log: ExecutionLogStorageConfig,
    /// JSON file holding an array of rules
    pub rules_path: String,
    /// JSON file holding an array of asset snapshots
    pub assets_path: String,
    pub event_queue_size: EventQueueSize,
    pub metrics_statsd_host: Option<String>,
    pub metrics_prefix: String,
}

impl Config {
    pub fn new() -> Result<Self> {
        let execution_timeout: ExecutionTimeout = default_env(
            "RULE_EXECUTION_TIMEOUT_MS",
            &DEFAULT_EXECUTION_TIMEOUT_MS.to_string(),
        )
        .try_into()?;

        let max_concurrent_executions: MaxConcurrentExecutions = default_env(
            "RULE_MAX_CONCURRENT_EXECUTIONS",
            &DEFAULT_MAX_CONCURRENT_EXECUTIONS.to_string(),
        )
        .try_into()?;

        let event_queue_size: EventQueueSize =
            default_env("EVENT_QUEUE_SIZE", &DEFAULT_EVENT_QUEUE_SIZE.to_string()).try_into()?;

        let execution_log = ExecutionLogStorageConfig::from_env()?;

        let rules_path = require_env("RULES_PATH")?;
        let assets_path = require_env("ASSETS_PATH")?;

        let metrics_statsd_host = optional_env("METRICS_STATSD_HOST");
        let metrics_statsd_host = if metrics_statsd_host.is_empty() {
            None
        } else {
            Some(metrics_statsd_host)
        };
        let metrics_prefix = default_env("METRICS_PREFIX", "assetrules");

        Ok(Self {
            version: version()?,
            execution_timeout,
            max_concurrent_executions,
            execution_log,
            rules_path,
            assets_path,
            event_queue_size,
            metrics_statsd_host,
            metrics_prefix,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired {
        var_name: name.to_string(),
    })
}

fn optional_env(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or(default_value.to_string())
}

/// Version string from `GIT_HASH` or `CARGO_PKG_VERSION` at compile time.
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotAvailable)
}
