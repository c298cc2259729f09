//! Configuration for the tally loader.
//!
//! Configs are YAML with environment variable interpolation, mirroring the
//! pipeline shape: a source directory of CSV files, a checkpoint store, an
//! aggregate definition, and a target table.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the input source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the directory of CSV input files.
    pub path: String,
}

/// Counting policy for the aggregate.
///
/// `All` mirrors SQL `count(col)` (non-null values); `Distinct` mirrors
/// `count(distinct col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountPolicy {
    All,
    Distinct,
}

/// Configuration for the grouped-count aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Column whose distinct values form the group keys.
    pub key_column: String,
    /// Column whose values are counted within each group.
    pub count_column: String,
    /// Count distinct values instead of all non-null values.
    #[serde(default)]
    pub distinct: bool,
    /// Name of the count column in the output table.
    #[serde(default = "default_output_column")]
    pub output_column: String,
}

fn default_output_column() -> String {
    "customer_count".to_string()
}

impl AggregateConfig {
    /// The effective counting policy.
    pub fn policy(&self) -> CountPolicy {
        if self.distinct {
            CountPolicy::Distinct
        } else {
            CountPolicy::All
        }
    }
}

/// Configuration for the target table sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory of the target table.
    pub table_uri: String,
    /// Maximum snapshot commit attempts before the batch fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Backoff between commit attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Trigger mode for the run coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Process one batch of currently available input, commit, and stop.
    Once,
    /// Process batches repeatedly until explicitly stopped.
    Continuous,
}

/// Configuration for triggering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Trigger mode.
    #[serde(default = "default_trigger_mode")]
    pub mode: TriggerMode,
    /// Poll interval for continuous mode, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Random jitter added to the poll interval, in seconds.
    #[serde(default)]
    pub poll_jitter_secs: u64,
}

fn default_trigger_mode() -> TriggerMode {
    TriggerMode::Once
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: default_trigger_mode(),
            poll_interval_secs: default_poll_interval(),
            poll_jitter_secs: 0,
        }
    }
}

/// Main configuration for a tally pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Stream identifier, used in logging, metrics, and checkpoint naming.
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Source configuration.
    pub source: SourceConfig,
    /// Checkpoint store root. Source and sink each own a partition below it.
    pub checkpoints: String,
    /// Aggregate configuration.
    pub aggregate: AggregateConfig,
    /// Sink configuration.
    pub sink: SinkConfig,
    /// Trigger configuration.
    #[serde(default)]
    pub trigger: TriggerConfig,
}

fn default_stream() -> String {
    "tally".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config: Config = serde_yaml::from_str(&result.text)
            .map_err(|source| ConfigError::YamlParse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.path.is_empty() {
            return Err(ConfigError::EmptySourcePath);
        }
        if self.checkpoints.is_empty() {
            return Err(ConfigError::EmptyCheckpointPath);
        }
        if self.sink.table_uri.is_empty() {
            return Err(ConfigError::EmptyTableUri);
        }
        if self.aggregate.key_column.is_empty() {
            return Err(ConfigError::EmptyKeyColumn);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
stream: customers
source:
  path: /data/retail-org/customers
checkpoints: /data/checkpoints/customers
aggregate:
  key_column: state
  count_column: customer_name
sink:
  table_uri: /data/tables/customer_count_by_state
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(EXAMPLE).unwrap();

        assert_eq!(config.stream, "customers");
        assert_eq!(config.aggregate.key_column, "state");
        assert_eq!(config.aggregate.policy(), CountPolicy::All);
        assert_eq!(config.aggregate.output_column, "customer_count");
        assert_eq!(config.trigger.mode, TriggerMode::Once);
        assert_eq!(config.sink.max_retries, 3);
    }

    #[test]
    fn test_parse_distinct_and_continuous() {
        let yaml = r#"
source:
  path: /in
checkpoints: /ckpt
aggregate:
  key_column: state
  count_column: customer_name
  distinct: true
sink:
  table_uri: /table
trigger:
  mode: continuous
  poll_interval_secs: 2
"#;
        let config = Config::parse(yaml).unwrap();

        assert_eq!(config.aggregate.policy(), CountPolicy::Distinct);
        assert_eq!(config.trigger.mode, TriggerMode::Continuous);
        assert_eq!(config.trigger.poll_interval_secs, 2);
    }

    #[test]
    fn test_empty_source_path_rejected() {
        let yaml = r#"
source:
  path: ""
checkpoints: /ckpt
aggregate:
  key_column: state
  count_column: customer_name
sink:
  table_uri: /table
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySourcePath));
    }

    #[test]
    fn test_env_interpolation_in_paths() {
        std::env::set_var("TALLY_CONFIG_TEST_ROOT", "/srv/tally");
        let yaml = r#"
source:
  path: ${TALLY_CONFIG_TEST_ROOT}/in
checkpoints: ${TALLY_CONFIG_TEST_ROOT}/ckpt
aggregate:
  key_column: state
  count_column: customer_name
sink:
  table_uri: ${TALLY_CONFIG_TEST_ROOT}/table
"#;
        let config = Config::parse(yaml).unwrap();
        std::env::remove_var("TALLY_CONFIG_TEST_ROOT");

        assert_eq!(config.source.path, "/srv/tally/in");
        assert_eq!(config.sink.table_uri, "/srv/tally/table");
    }
}
